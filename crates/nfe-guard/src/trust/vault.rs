//! Credential vault: AES-256-GCM encryption of secrets at rest.

use crate::config::{ConfigError, ConfigSource};
use crate::trust::mask;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

/// Leading byte of every ciphertext produced by this vault.
const FORMAT_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Prefix marking an encrypted configuration value.
pub const ENCRYPTED_PREFIX: &str = "enc:";

/// Vault failures. None of these carry key material or plaintext.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("decryption failed: ciphertext is corrupt, tampered with, or was sealed under another key")]
    DecryptionError,
    #[error("encryption failed")]
    EncryptionError,
    #[error("invalid vault key: expected {KEY_LEN} bytes of base64")]
    InvalidKey,
    #[error("no vault key configured (set NFE_GUARD_KEY or NFE_GUARD_KEY_FILE)")]
    MissingKey,
    #[error("vault key file error: {0}")]
    KeyFile(#[from] std::io::Error),
}

/// 256-bit symmetric key. Zeroized on drop, never printed.
#[derive(Clone)]
pub struct VaultKey([u8; KEY_LEN]);

impl VaultKey {
    /// Generate a fresh random key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, VaultError> {
        let mut decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| VaultError::InvalidKey)?;
        if decoded.len() != KEY_LEN {
            decoded.zeroize();
            return Err(VaultError::InvalidKey);
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(bytes))
    }

    /// Base64 form, for writing to a key file. Handle with care.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl Drop for VaultKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey(***)")
    }
}

/// Encrypts and decrypts credentials under a single key.
#[derive(Clone)]
pub struct CredentialVault {
    cipher: Aes256Gcm,
}

impl CredentialVault {
    pub fn new(key: &VaultKey) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
        Self { cipher }
    }

    /// Seal a plaintext secret. Output is base64 of `version ‖ nonce ‖ ciphertext`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| VaultError::EncryptionError)?;

        let mut out = Vec::with_capacity(1 + NONCE_LEN + sealed.len());
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    /// Open a sealed secret. Fails closed on any tampering or key mismatch.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, VaultError> {
        let raw = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| VaultError::DecryptionError)?;
        if raw.len() < 1 + NONCE_LEN || raw[0] != FORMAT_VERSION {
            return Err(VaultError::DecryptionError);
        }
        let nonce = Nonce::from_slice(&raw[1..1 + NONCE_LEN]);
        let mut plain = self
            .cipher
            .decrypt(nonce, &raw[1 + NONCE_LEN..])
            .map_err(|_| VaultError::DecryptionError)?;

        match String::from_utf8(plain) {
            Ok(text) => Ok(text),
            Err(e) => {
                plain = e.into_bytes();
                plain.zeroize();
                Err(VaultError::DecryptionError)
            }
        }
    }

    /// Decrypt a configuration value if it carries the `enc:` prefix.
    pub fn reveal(&self, value: &str) -> Result<String, VaultError> {
        match value.strip_prefix(ENCRYPTED_PREFIX) {
            Some(sealed) => self.decrypt(sealed),
            None => Ok(value.to_string()),
        }
    }

    /// Seal a value and add the `enc:` prefix, ready to paste into a `.env`.
    pub fn seal_for_config(&self, plaintext: &str) -> Result<String, VaultError> {
        Ok(format!("{ENCRYPTED_PREFIX}{}", self.encrypt(plaintext)?))
    }

    /// Display form of a secret. See [`mask::mask`].
    pub fn mask(secret: &str) -> String {
        mask::mask(secret)
    }

    /// Check that every required key is present and non-empty.
    ///
    /// Reports all missing keys in one error rather than stopping at the first.
    pub fn load_required_config(
        source: &dyn ConfigSource,
        keys: &[&str],
    ) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut values = BTreeMap::new();
        let mut missing = Vec::new();

        for key in keys {
            match source.get(key) {
                Some(value) if !value.trim().is_empty() => {
                    values.insert((*key).to_string(), value);
                }
                _ => missing.push((*key).to_string()),
            }
        }

        if missing.is_empty() {
            Ok(values)
        } else {
            Err(ConfigError::MissingConfig(missing))
        }
    }
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialVault { .. }")
    }
}
