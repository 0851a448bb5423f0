//! CLI subcommand implementations for the `nfe-guard` binary.

pub mod audit_cmd;
pub mod check_config;
pub mod keygen;
pub mod secret;
pub mod validate;

use anyhow::{Context, Result};
use nfe_guard::config::LayeredSource;
use nfe_guard::trust::resolve_key;
use nfe_guard::{ConfigSource, CredentialVault, VaultError};
use std::path::Path;

/// Process environment layered over the `.env` file, if it exists.
pub fn load_source(env_file: &Path) -> Result<LayeredSource> {
    LayeredSource::env_over_file(Some(env_file))
        .with_context(|| format!("failed to load {}", env_file.display()))
}

/// Vault from `NFE_GUARD_KEY` / `NFE_GUARD_KEY_FILE`. `None` when neither is set.
pub fn optional_vault(source: &dyn ConfigSource) -> Result<Option<CredentialVault>> {
    match resolve_key(source) {
        Ok(key) => Ok(Some(CredentialVault::new(&key))),
        Err(VaultError::MissingKey) => Ok(None),
        Err(e) => Err(e).context("vault key is set but unusable"),
    }
}

/// Vault that must be configured for the command to proceed.
pub fn required_vault(source: &dyn ConfigSource) -> Result<CredentialVault> {
    optional_vault(source)?
        .context("no vault key: set NFE_GUARD_KEY or NFE_GUARD_KEY_FILE (see `nfe-guard keygen`)")
}
