//! Generate a vault key.

use crate::output::{self, Styled};
use anyhow::{bail, Context, Result};
use nfe_guard::trust::load_or_create_key_file;
use nfe_guard::VaultKey;
use std::path::Path;

/// Write a new key file at `out`, or print a fresh base64 key to stdout.
pub fn run(out: Option<&Path>) -> Result<()> {
    let Some(path) = out else {
        println!("{}", VaultKey::generate().to_base64());
        return Ok(());
    };

    if path.exists() {
        bail!("{} already exists; refusing to replace a vault key", path.display());
    }
    load_or_create_key_file(path)
        .with_context(|| format!("failed to create key file {}", path.display()))?;

    if output::is_json() {
        output::print_json(&serde_json::json!({ "key_file": path.display().to_string() }));
    } else {
        let s = Styled::new();
        output::print_check(s.ok_sym(), "key file", &path.display().to_string());
        output::print_detail(&format!("export NFE_GUARD_KEY_FILE={}", path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.key");

        run(Some(&path)).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        assert!(run(Some(&path)).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
    }
}
