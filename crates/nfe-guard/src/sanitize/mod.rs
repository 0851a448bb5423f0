//! Field sanitizers: one total function per field kind.
//!
//! Every function returns either the cleaned value or a [`FieldReason`].
//! Nothing here panics on input and nothing echoes input back in a reason.

pub mod access_key;
pub mod numeric;
pub mod tax_id;
pub mod text;

pub use access_key::{sanitize_access_key, AccessKey};
pub use numeric::{sanitize_money, sanitize_numeric, DecimalSeparator, MonetaryValue, NumericPolicy};
pub use tax_id::{check_digits, sanitize_tax_id, sanitize_tax_id_with, TaxId, TaxIdScheme};
pub use text::{inspect, sanitize_string, sanitize_string_with, Threat, DEFAULT_MAX_LENGTH};

use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Why a field was rejected. The display form is a stable short code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum FieldReason {
    #[error("missing")]
    Missing,
    #[error("length")]
    Length,
    #[error("invalid character")]
    InvalidCharacter,
    #[error("unsupported format")]
    UnsupportedFormat,
    #[error("check digit")]
    CheckDigit,
    #[error("not numeric")]
    NotNumeric,
    #[error("multiple separators")]
    MultipleSeparators,
    #[error("too many decimals")]
    TooManyDecimals,
    #[error("negative")]
    Negative,
    #[error("overflow")]
    Overflow,
    #[error("above maximum")]
    AboveMaximum,
    #[error("not positive")]
    NotPositive,
    #[error("invalid date")]
    InvalidDate,
    #[error("out of range")]
    OutOfRange,
    #[error("too many")]
    TooMany,
}

impl FieldReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldReason::Missing => "missing",
            FieldReason::Length => "length",
            FieldReason::InvalidCharacter => "invalid character",
            FieldReason::UnsupportedFormat => "unsupported format",
            FieldReason::CheckDigit => "check digit",
            FieldReason::NotNumeric => "not numeric",
            FieldReason::MultipleSeparators => "multiple separators",
            FieldReason::TooManyDecimals => "too many decimals",
            FieldReason::Negative => "negative",
            FieldReason::Overflow => "overflow",
            FieldReason::AboveMaximum => "above maximum",
            FieldReason::NotPositive => "not positive",
            FieldReason::InvalidDate => "invalid date",
            FieldReason::OutOfRange => "out of range",
            FieldReason::TooMany => "too many",
        }
    }
}

impl Serialize for FieldReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A named field that failed sanitization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub reason: FieldReason,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: FieldReason) -> Self {
        Self {
            field: field.into(),
            reason,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Sanitizer settings shared by every field of one record.
#[derive(Debug, Clone)]
pub struct FieldSanitizer {
    pub max_string_length: usize,
    pub tax_id_scheme: TaxIdScheme,
    pub separator: DecimalSeparator,
}

impl Default for FieldSanitizer {
    fn default() -> Self {
        Self {
            max_string_length: DEFAULT_MAX_LENGTH,
            tax_id_scheme: TaxIdScheme::default(),
            separator: DecimalSeparator::default(),
        }
    }
}

impl FieldSanitizer {
    pub fn text(&self, value: &str) -> String {
        sanitize_string_with(value, self.max_string_length)
    }

    pub fn tax_id(&self, value: &str) -> Result<TaxId, FieldReason> {
        sanitize_tax_id_with(value, self.tax_id_scheme)
    }

    pub fn access_key(&self, value: &str) -> Result<AccessKey, FieldReason> {
        sanitize_access_key(value)
    }

    pub fn money(&self, value: &str) -> Result<MonetaryValue, FieldReason> {
        let policy = NumericPolicy::money().with_separator(self.separator);
        sanitize_numeric(value, &policy).map(MonetaryValue::from_decimal)
    }

    /// Non-negative decimal with at most `max_scale` fractional digits.
    pub fn decimal(&self, value: &str, max_scale: u32) -> Result<Decimal, FieldReason> {
        let policy = NumericPolicy::money()
            .with_separator(self.separator)
            .with_max_scale(max_scale);
        sanitize_numeric(value, &policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_are_stable() {
        assert_eq!(FieldReason::Length.to_string(), "length");
        assert_eq!(FieldReason::MultipleSeparators.as_str(), "multiple separators");
        assert_eq!(
            serde_json::to_string(&FieldError::new("emit/CNPJ", FieldReason::CheckDigit)).unwrap(),
            r#"{"field":"emit/CNPJ","reason":"check digit"}"#
        );
    }

    #[test]
    fn test_field_sanitizer_uses_settings() {
        let sanitizer = FieldSanitizer {
            max_string_length: 5,
            separator: DecimalSeparator::Comma,
            ..FieldSanitizer::default()
        };
        assert_eq!(sanitizer.text("abcdefgh"), "abcde");
        assert_eq!(sanitizer.money("1.234,5").unwrap().to_string(), "1234.50");
        assert_eq!(sanitizer.decimal("2,5000", 4).unwrap(), "2.5".parse::<Decimal>().unwrap());
        assert_eq!(sanitizer.tax_id("12.ABC.345/01DE-35"), Err(FieldReason::UnsupportedFormat));
    }
}
