//! Credential vault, key files and secret masking.

pub mod key_file;
pub mod mask;
pub mod vault;

pub use key_file::{load_or_create_key_file, resolve_key};
pub use mask::{mask, mask_database_url, redact};
pub use vault::{CredentialVault, VaultError, VaultKey};
