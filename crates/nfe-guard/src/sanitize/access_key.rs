//! NF-e access key (chave de acesso).

use crate::sanitize::FieldReason;
use serde::Serialize;
use std::fmt;

const LEN: usize = 44;
const ID_PREFIX: &str = "NFe";

/// Exactly 44 digits. Only length and charset are enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AccessKey(String);

impl AccessKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// IBGE code of the issuing state (first two digits).
    pub fn state_code(&self) -> &str {
        &self.0[0..2]
    }

    /// Issuer CNPJ digits embedded at positions 7..20.
    pub fn issuer_digits(&self) -> &str {
        &self.0[6..20]
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip formatting and the `NFe` id prefix, then require 44 digits.
pub fn sanitize_access_key(value: &str) -> Result<AccessKey, FieldReason> {
    let trimmed = value.trim();
    let body = trimmed.strip_prefix(ID_PREFIX).unwrap_or(trimmed);

    let digits: String = body
        .chars()
        .filter(|c| !matches!(c, '.' | '/' | '-') && !c.is_whitespace())
        .collect();

    if digits.is_empty() {
        return Err(FieldReason::Missing);
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(FieldReason::InvalidCharacter);
    }
    if digits.len() != LEN {
        return Err(FieldReason::Length);
    }

    Ok(AccessKey(digits))
}
