//! Feed handler configuration
//!
//! Loaded from a TOML file at startup. Every field has a default, so an
//! absent file or section yields a working configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub buffer: BufferConfig,

    #[serde(default)]
    pub snapshots: SnapshotsConfig,

    #[serde(default)]
    pub books: BooksConfig,
}

/// Reorder buffer settings for the incremental channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BufferConfig {
    /// Slots in the reorder window
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Largest forward jump waited for before the missing seqnums are
    /// declared lost
    #[serde(default = "default_max_gap")]
    pub max_gap: u32,

    /// 0: errors only, 1: per-event warnings, 2: per-message debug
    #[serde(default = "default_debug_level")]
    pub debug_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SnapshotsConfig {
    /// Snapshot rounds tried before the bootstrap is abandoned
    #[serde(default = "default_max_init_rounds")]
    pub max_init_rounds: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BooksConfig {
    /// SecurityIDs to build books for
    #[serde(default)]
    pub sec_ids: Vec<u64>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            max_gap: default_max_gap(),
            debug_level: default_debug_level(),
        }
    }
}

impl Default for SnapshotsConfig {
    fn default() -> Self {
        Self {
            max_init_rounds: default_max_init_rounds(),
        }
    }
}

fn default_capacity() -> usize {
    1024
}

fn default_max_gap() -> u32 {
    16
}

fn default_debug_level() -> u8 {
    1
}

fn default_max_init_rounds() -> u32 {
    3
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

impl FeedConfig {
    /// Load from the file named by `FEED_CONFIG` (default `feed.toml`).
    ///
    /// A missing file gives the defaults; a file that exists but does not
    /// parse is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("FEED_CONFIG").unwrap_or_else(|_| "feed.toml".to_string());

        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FeedConfig::default()),
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: FeedConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer.capacity == 0 {
            return Err(ConfigError::Invalid("buffer.capacity must be positive"));
        }
        if self.snapshots.max_init_rounds == 0 {
            return Err(ConfigError::Invalid("snapshots.max_init_rounds must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FeedConfig::default();
        assert_eq!(config.buffer.capacity, 1024);
        assert_eq!(config.buffer.max_gap, 16);
        assert_eq!(config.buffer.debug_level, 1);
        assert_eq!(config.snapshots.max_init_rounds, 3);
        assert!(config.books.sec_ids.is_empty());
    }

    #[test]
    fn test_partial_toml() {
        let config = FeedConfig::from_toml_str(
            r#"
            [buffer]
            max_gap = 4

            [books]
            sec_ids = [101, 202]
            "#,
        )
        .unwrap();
        assert_eq!(config.buffer.max_gap, 4);
        assert_eq!(config.buffer.capacity, 1024);
        assert_eq!(config.books.sec_ids, vec![101, 202]);
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            FeedConfig::from_toml_str("[buffer\ncapacity = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_rounds_rejected() {
        assert!(matches!(
            FeedConfig::from_toml_str("[snapshots]\nmax_init_rounds = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }
}
