//! Key/value configuration sources: process environment, `.env` files, maps.

use crate::config::ConfigError;
use std::collections::HashMap;
use std::path::Path;

/// Anything that can answer "what is the value of KEY?".
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory source, mostly for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MapSource {
    values: HashMap<String, String>,
}

impl MapSource {
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Values parsed from a `.env` file.
///
/// Supports `KEY=value`, optional `export ` prefixes, `#` comments and single
/// or double quotes around values. No interpolation.
#[derive(Debug, Default, Clone)]
pub struct DotEnvSource {
    inner: MapSource,
}

impl DotEnvSource {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut inner = MapSource::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            inner.set(key, unquote(value.trim()));
        }
        Self { inner }
    }
}

impl ConfigSource for DotEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Ordered stack of sources; the first one with a value wins.
#[derive(Default)]
pub struct LayeredSource {
    layers: Vec<Box<dyn ConfigSource>>,
}

impl LayeredSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl ConfigSource + 'static) -> Self {
        self.layers.push(Box::new(source));
        self
    }

    /// Process environment over an optional `.env` file.
    pub fn env_over_file(dotenv: Option<&Path>) -> Result<Self, ConfigError> {
        let mut layered = Self::new().with(EnvSource);
        if let Some(path) = dotenv {
            if path.exists() {
                layered = layered.with(DotEnvSource::from_path(path)?);
            }
        }
        Ok(layered)
    }
}

impl ConfigSource for LayeredSource {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotenv_parse() {
        let source = DotEnvSource::parse(
            r#"
# comment
EMAIL_USER=fiscal@empresa.com.br
export DATABASE_URL="postgresql://app:pw@db/nfe"
GEMINI_API_KEY='abc=def'
BROKEN LINE
=novalue
"#,
        );
        assert_eq!(source.get("EMAIL_USER").as_deref(), Some("fiscal@empresa.com.br"));
        assert_eq!(
            source.get("DATABASE_URL").as_deref(),
            Some("postgresql://app:pw@db/nfe")
        );
        assert_eq!(source.get("GEMINI_API_KEY").as_deref(), Some("abc=def"));
        assert!(source.get("BROKEN LINE").is_none());
    }

    #[test]
    fn test_layered_first_wins() {
        let layered = LayeredSource::new()
            .with(MapSource::from_pairs([("A", "top")]))
            .with(MapSource::from_pairs([("A", "bottom"), ("B", "only-bottom")]));
        assert_eq!(layered.get("A").as_deref(), Some("top"));
        assert_eq!(layered.get("B").as_deref(), Some("only-bottom"));
        assert!(layered.get("C").is_none());
    }

    #[test]
    fn test_dotenv_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DotEnvSource::from_path(&dir.path().join("nope.env")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
