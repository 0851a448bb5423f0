//! Configuration: environment-style sources and the consolidated `GuardConfig`.

pub mod settings;
pub mod source;

pub use settings::{Credentials, GuardConfig, Secret, REQUIRED_KEYS};
pub use source::{ConfigSource, DotEnvSource, EnvSource, LayeredSource, MapSource};

use crate::trust::VaultError;
use std::path::PathBuf;
use thiserror::Error;

/// Startup configuration failures. Messages name keys, never values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    MissingConfig(Vec<String>),
    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not decrypt {key}: {source}")]
    Secret { key: String, source: VaultError },
}
