//! Locale-explicit decimal parsing backed by `rust_decimal`.

use crate::sanitize::FieldReason;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Which character separates the fractional part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecimalSeparator {
    /// `1.234,56`
    Comma,
    /// `1,234.56` and the NF-e XML wire format.
    Dot,
    /// The last separator present is the decimal one.
    #[default]
    Auto,
}

impl DecimalSeparator {
    fn split(self, body: &str) -> Result<(String, String), FieldReason> {
        let commas = body.matches(',').count();
        let dots = body.matches('.').count();

        let decimal = match self {
            DecimalSeparator::Comma => (commas > 0).then_some(','),
            DecimalSeparator::Dot => (dots > 0).then_some('.'),
            DecimalSeparator::Auto => match (commas, dots) {
                (0, 0) => None,
                (_, 0) if commas > 1 => return Err(FieldReason::MultipleSeparators),
                (0, _) if dots > 1 => return Err(FieldReason::MultipleSeparators),
                _ => body.chars().rev().find(|c| matches!(c, ',' | '.')),
            },
        };

        let Some(decimal) = decimal else {
            return Ok((strip_grouping(body)?, String::new()));
        };
        if body.matches(decimal).count() > 1 {
            return Err(FieldReason::MultipleSeparators);
        }

        let (int_part, frac_part) = body.split_once(decimal).ok_or(FieldReason::NotNumeric)?;
        if frac_part.is_empty() || !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(FieldReason::NotNumeric);
        }
        Ok((strip_grouping(int_part)?, frac_part.to_string()))
    }
}

/// Remove thousands separators. Groups after the first must have three digits.
fn strip_grouping(int_part: &str) -> Result<String, FieldReason> {
    if int_part.is_empty() {
        return Ok("0".to_string());
    }
    let groups: Vec<&str> = int_part.split([',', '.']).collect();
    let (first, rest) = groups.split_first().ok_or(FieldReason::NotNumeric)?;
    if first.is_empty() || (!rest.is_empty() && first.len() > 3) || rest.iter().any(|g| g.len() != 3) {
        return Err(FieldReason::NotNumeric);
    }
    Ok(groups.concat())
}

/// Rules for one numeric field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericPolicy {
    pub separator: DecimalSeparator,
    /// Maximum significant fractional digits. Trailing zeros beyond it are accepted.
    pub max_scale: u32,
    pub allow_negative: bool,
    pub max_value: Option<Decimal>,
}

impl NumericPolicy {
    /// Non-negative amount with two fractional digits, at most [`MonetaryValue::max_amount`].
    pub fn money() -> Self {
        Self {
            separator: DecimalSeparator::Auto,
            max_scale: MonetaryValue::SCALE,
            allow_negative: false,
            max_value: Some(MonetaryValue::max_amount()),
        }
    }

    pub fn with_separator(mut self, separator: DecimalSeparator) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_max_scale(mut self, max_scale: u32) -> Self {
        self.max_scale = max_scale;
        self
    }

    pub fn with_max_value(mut self, max_value: Decimal) -> Self {
        self.max_value = Some(max_value);
        self
    }

    pub fn allowing_negative(mut self) -> Self {
        self.allow_negative = true;
        self
    }
}

/// Parse a decimal string under `policy`. The result is normalized.
pub fn sanitize_numeric(value: &str, policy: &NumericPolicy) -> Result<Decimal, FieldReason> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FieldReason::Missing);
    }

    let (negative, body) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    if !body.chars().any(|c| c.is_ascii_digit())
        || !body.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.')
    {
        return Err(FieldReason::NotNumeric);
    }

    let (int_part, frac_part) = policy.separator.split(body)?;

    let frac = frac_part.trim_end_matches('0');
    if frac.len() > policy.max_scale as usize {
        return Err(FieldReason::TooManyDecimals);
    }

    let int = int_part.trim_start_matches('0');
    let int = if int.is_empty() { "0" } else { int };
    let literal = if frac.is_empty() {
        int.to_string()
    } else {
        format!("{int}.{frac}")
    };

    let magnitude = Decimal::from_str_exact(&literal).map_err(|_| FieldReason::Overflow)?;
    let value = if negative { -magnitude } else { magnitude };

    if value.is_sign_negative() && !value.is_zero() && !policy.allow_negative {
        return Err(FieldReason::Negative);
    }
    if let Some(max) = policy.max_value {
        if value > max {
            return Err(FieldReason::AboveMaximum);
        }
    }

    Ok(value.normalize())
}

/// Parse a money amount with the default policy.
pub fn sanitize_money(value: &str) -> Result<MonetaryValue, FieldReason> {
    sanitize_numeric(value, &NumericPolicy::money()).map(MonetaryValue::from_decimal)
}

/// Non-negative amount held at exactly two fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct MonetaryValue(Decimal);

impl MonetaryValue {
    pub const SCALE: u32 = 2;
    /// Largest accepted amount in cents (999 999 999.99).
    pub const MAX_CENTS: i64 = 99_999_999_999;

    pub fn max_amount() -> Decimal {
        Decimal::new(Self::MAX_CENTS, Self::SCALE)
    }

    pub(crate) fn from_decimal(mut amount: Decimal) -> Self {
        amount.rescale(Self::SCALE);
        Self(amount)
    }

    pub fn zero() -> Self {
        Self::from_decimal(Decimal::ZERO)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for MonetaryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn comma() -> NumericPolicy {
        NumericPolicy::money().with_separator(DecimalSeparator::Comma)
    }

    #[test]
    fn test_comma_convention() {
        assert_eq!(sanitize_numeric("1.234,56", &comma()), Ok(dec("1234.56")));
        assert_eq!(
            sanitize_numeric("12,34,56", &comma()),
            Err(FieldReason::MultipleSeparators)
        );
        assert_eq!(sanitize_numeric("1.234.567,8", &comma()), Ok(dec("1234567.8")));
        assert_eq!(sanitize_numeric("5.3", &comma()), Err(FieldReason::NotNumeric));
        assert_eq!(sanitize_numeric("1.234", &comma()), Ok(dec("1234")));
    }

    #[test]
    fn test_dot_convention() {
        let dot = NumericPolicy::money().with_separator(DecimalSeparator::Dot);
        assert_eq!(sanitize_numeric("1,234.56", &dot), Ok(dec("1234.56")));
        assert_eq!(sanitize_numeric("1580.00", &dot), Ok(dec("1580")));
        assert_eq!(sanitize_numeric("1.2.3", &dot), Err(FieldReason::MultipleSeparators));
    }

    #[test]
    fn test_auto_convention() {
        let auto = NumericPolicy::money();
        assert_eq!(sanitize_numeric("1.234,56", &auto), Ok(dec("1234.56")));
        assert_eq!(sanitize_numeric("1,234.56", &auto), Ok(dec("1234.56")));
        assert_eq!(sanitize_numeric("99,9", &auto), Ok(dec("99.9")));
        assert_eq!(sanitize_numeric("42", &auto), Ok(dec("42")));
        assert_eq!(sanitize_numeric("1.234.567", &auto), Err(FieldReason::MultipleSeparators));
        assert_eq!(sanitize_numeric("1.234,5,6", &auto), Err(FieldReason::MultipleSeparators));
    }

    #[test]
    fn test_scale() {
        let auto = NumericPolicy::money();
        assert_eq!(sanitize_numeric("10.500000", &auto), Ok(dec("10.5")));
        assert_eq!(sanitize_numeric("10.505", &auto), Err(FieldReason::TooManyDecimals));
        let quantity = NumericPolicy::money().with_max_scale(4);
        assert_eq!(sanitize_numeric("3.1415", &quantity), Ok(dec("3.1415")));
    }

    #[test]
    fn test_sign_handling() {
        let auto = NumericPolicy::money();
        assert_eq!(sanitize_numeric("-5", &auto), Err(FieldReason::Negative));
        assert_eq!(sanitize_numeric("+5", &auto), Ok(dec("5")));
        assert_eq!(sanitize_numeric("-0.00", &auto), Ok(Decimal::ZERO));
        assert_eq!(sanitize_numeric("-5", &auto.clone().allowing_negative()), Ok(dec("-5")));
        assert_eq!(sanitize_numeric("--5", &auto), Err(FieldReason::NotNumeric));
    }

    #[test]
    fn test_not_numeric() {
        let auto = NumericPolicy::money();
        for input in ["abc", "NaN", "inf", "1e5", "R$ 10", ".", "1.", "1..2", "0x10"] {
            assert!(sanitize_numeric(input, &auto).is_err(), "accepted {input:?}");
        }
        assert_eq!(sanitize_numeric("", &auto), Err(FieldReason::Missing));
        assert_eq!(sanitize_numeric(",5", &auto), Ok(dec("0.5")));
    }

    #[test]
    fn test_overflow_and_maximum() {
        let auto = NumericPolicy::money();
        assert_eq!(sanitize_numeric(&"9".repeat(40), &auto), Err(FieldReason::Overflow));
        let capped = NumericPolicy::money().with_max_value(dec("999999999.99"));
        assert_eq!(sanitize_numeric("999999999.99", &capped), Ok(dec("999999999.99")));
        assert_eq!(sanitize_numeric("1000000000", &capped), Err(FieldReason::AboveMaximum));
        assert_eq!(sanitize_numeric(&format!("{}1", "0".repeat(60)), &auto), Ok(dec("1")));
    }

    #[test]
    fn test_money_ceiling_keeps_two_decimals() {
        assert_eq!(sanitize_money("999999999.99").unwrap().to_string(), "999999999.99");
        assert_eq!(sanitize_money("1000000000"), Err(FieldReason::AboveMaximum));
        assert_eq!(
            sanitize_money("40000000000000000000000000000"),
            Err(FieldReason::AboveMaximum)
        );
        assert_eq!(sanitize_money("0.5").unwrap().amount().scale(), MonetaryValue::SCALE);
    }

    #[test]
    fn test_monetary_value_display() {
        assert_eq!(sanitize_money("1580").unwrap().to_string(), "1580.00");
        assert_eq!(sanitize_money("0,5").unwrap().to_string(), "0.50");
        assert_eq!(MonetaryValue::zero().to_string(), "0.00");
        assert_eq!(
            serde_json::to_string(&sanitize_money("12.3").unwrap()).unwrap(),
            "\"12.30\""
        );
    }
}
