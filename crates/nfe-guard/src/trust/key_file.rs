//! Vault key persistence and lookup.

use crate::config::ConfigSource;
use crate::trust::vault::{VaultError, VaultKey};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Environment key holding a base64 vault key.
pub const KEY_ENV: &str = "NFE_GUARD_KEY";
/// Environment key naming a key file.
pub const KEY_FILE_ENV: &str = "NFE_GUARD_KEY_FILE";

/// Read the key at `path`, or generate one and write it there.
///
/// New key files are created owner-read/write only. An existing file is never
/// overwritten.
pub fn load_or_create_key_file(path: &Path) -> Result<VaultKey, VaultError> {
    if path.exists() {
        return read_key_file(path);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let key = VaultKey::generate();
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(key.to_base64().as_bytes())?;
    file.sync_all()?;

    info!("created vault key file at {}", path.display());
    Ok(key)
}

/// Read an existing key file.
pub fn read_key_file(path: &Path) -> Result<VaultKey, VaultError> {
    let mut file = std::fs::File::open(path)?;
    let mut encoded = String::new();
    file.read_to_string(&mut encoded)?;
    let key = VaultKey::from_base64(&encoded);
    zeroize::Zeroize::zeroize(&mut encoded);
    key
}

/// Resolve the vault key from configuration: `NFE_GUARD_KEY` first, then the
/// file named by `NFE_GUARD_KEY_FILE`.
pub fn resolve_key(source: &dyn ConfigSource) -> Result<VaultKey, VaultError> {
    if let Some(encoded) = source.get(KEY_ENV).filter(|v| !v.trim().is_empty()) {
        return VaultKey::from_base64(&encoded);
    }
    if let Some(path) = source.get(KEY_FILE_ENV).filter(|v| !v.trim().is_empty()) {
        return read_key_file(Path::new(path.trim()));
    }
    Err(VaultError::MissingKey)
}
