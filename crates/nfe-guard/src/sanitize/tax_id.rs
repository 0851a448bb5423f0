//! CNPJ validation with the modulo-11 check digits.

use crate::sanitize::FieldReason;
use serde::Serialize;
use std::fmt;

const LEN: usize = 14;
const FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Accepted CNPJ character sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaxIdScheme {
    /// Fourteen digits. Letters are rejected as `unsupported format`.
    #[default]
    Numeric,
    /// Alphanumeric base (`0-9A-Z`) with numeric check digits. Each character
    /// counts as its ASCII code minus 48.
    Alphanumeric,
}

/// A CNPJ whose check digits have been verified. Stored without punctuation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaxId(String);

impl TaxId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical display form `NN.NNN.NNN/NNNN-NN`.
    pub fn formatted(&self) -> String {
        let s = &self.0;
        format!("{}.{}.{}/{}-{}", &s[0..2], &s[2..5], &s[5..8], &s[8..12], &s[12..14])
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

/// Validate a numeric CNPJ.
pub fn sanitize_tax_id(value: &str) -> Result<TaxId, FieldReason> {
    sanitize_tax_id_with(value, TaxIdScheme::Numeric)
}

/// Validate a CNPJ under the given scheme.
///
/// Formatting characters (`.`, `/`, `-`, whitespace) are stripped; anything
/// else is rejected, never dropped.
pub fn sanitize_tax_id_with(value: &str, scheme: TaxIdScheme) -> Result<TaxId, FieldReason> {
    let stripped: String = value
        .chars()
        .filter(|c| !matches!(c, '.' | '/' | '-') && !c.is_whitespace())
        .map(|c| match scheme {
            TaxIdScheme::Numeric => c,
            TaxIdScheme::Alphanumeric => c.to_ascii_uppercase(),
        })
        .collect();

    if stripped.is_empty() {
        return Err(FieldReason::Missing);
    }

    for c in stripped.chars() {
        match (scheme, c) {
            (_, '0'..='9') => {}
            (TaxIdScheme::Numeric, c) if c.is_alphabetic() => {
                return Err(FieldReason::UnsupportedFormat)
            }
            (TaxIdScheme::Alphanumeric, 'A'..='Z') => {}
            _ => return Err(FieldReason::InvalidCharacter),
        }
    }

    if stripped.len() != LEN {
        return Err(FieldReason::Length);
    }

    let values: Vec<u32> = stripped.chars().map(char_value).collect();
    if !values[12..].iter().all(|v| *v <= 9) {
        return Err(FieldReason::CheckDigit);
    }

    let mut base = [0u32; 12];
    base.copy_from_slice(&values[..12]);
    if check_digits(&base) != [values[12], values[13]] {
        return Err(FieldReason::CheckDigit);
    }

    Ok(TaxId(stripped))
}

/// Both check digits for a 12-position base.
pub fn check_digits(base: &[u32; 12]) -> [u32; 2] {
    let first = weighted_digit(base, &FIRST_WEIGHTS);
    let mut extended = [0u32; 13];
    extended[..12].copy_from_slice(base);
    extended[12] = first;
    [first, weighted_digit(&extended, &SECOND_WEIGHTS)]
}

fn weighted_digit(values: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = values.iter().zip(weights).map(|(v, w)| v * w).sum();
    match sum % 11 {
        r if r < 2 => 0,
        r => 11 - r,
    }
}

fn char_value(c: char) -> u32 {
    (c as u32).saturating_sub(48)
}
