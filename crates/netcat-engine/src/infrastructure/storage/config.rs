//! TOML-based engine configuration.
//!
//! ```toml
//! message_capacity = 500
//! event_capacity = 1024
//! connect_timeout_ms = 5000
//! read_buffer_size = 8192
//! udp_idle_timeout_secs = 300
//! log_level = "info"
//! ```
//!
//! Every field has a serde default, so a missing file, an empty file, or a
//! file written by an older version all load cleanly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

// ── Config schema ─────────────────────────────────────────────────────────────

/// Runtime settings shared by every session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Records kept per session before the oldest is evicted.
    #[serde(default = "default_message_capacity")]
    pub message_capacity: usize,
    /// Queue depth of each event subscriber.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Upper bound on a TCP client connect attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Bytes requested per TCP read.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Idle time after which a UDP peer leaves a server roster.  `0` disables
    /// eviction.
    #[serde(default = "default_udp_idle_timeout_secs")]
    pub udp_idle_timeout_secs: u64,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_message_capacity() -> usize {
    netcat_core::store::DEFAULT_CAPACITY
}
fn default_event_capacity() -> usize {
    crate::infrastructure::event_bus::DEFAULT_EVENT_CAPACITY
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_read_buffer_size() -> usize {
    8_192
}
fn default_udp_idle_timeout_secs() -> u64 {
    300
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            message_capacity: default_message_capacity(),
            event_capacity: default_event_capacity(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_buffer_size: default_read_buffer_size(),
            udp_idle_timeout_secs: default_udp_idle_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `None` when eviction is disabled.
    pub fn udp_idle_timeout(&self) -> Option<Duration> {
        (self.udp_idle_timeout_secs > 0).then(|| Duration::from_secs(self.udp_idle_timeout_secs))
    }

    /// Rejects values that would make the engine unusable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigFileError> {
        let invalid = |field| ConfigFileError::Invalid {
            field,
            reason: "must be greater than zero",
        };
        if self.message_capacity == 0 {
            return Err(invalid("message_capacity"));
        }
        if self.event_capacity == 0 {
            return Err(invalid("event_capacity"));
        }
        if self.read_buffer_size == 0 {
            return Err(invalid("read_buffer_size"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(invalid("connect_timeout_ms"));
        }
        Ok(())
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads and validates `EngineConfig` from `path`, returning defaults if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] for file-system errors other than "not
/// found", [`ConfigFileError::Parse`] if the TOML is malformed, and
/// [`ConfigFileError::Invalid`] for out-of-range values.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigFileError> {
    let cfg = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str::<EngineConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => EngineConfig::default(),
        Err(e) => {
            return Err(ConfigFileError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] for file-system failures or
/// [`ConfigFileError::Serialize`] if serialization fails.
pub fn save_config(config: &EngineConfig, path: &Path) -> Result<(), ConfigFileError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigFileError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.message_capacity, 500);
        assert_eq!(cfg.event_capacity, 1024);
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.udp_idle_timeout(), Some(Duration::from_secs(300)));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netcat.toml");
        std::fs::write(&path, "message_capacity = 50\nudp_idle_timeout_secs = 0\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.message_capacity, 50);
        assert_eq!(cfg.udp_idle_timeout(), None);
        assert_eq!(cfg.read_buffer_size, 8192);
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("netcat.toml");
        let cfg = EngineConfig {
            connect_timeout_ms: 250,
            log_level: "debug".to_string(),
            ..EngineConfig::default()
        };

        save_config(&cfg, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), cfg);
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "message_capacity = \"lots\"").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigFileError::Parse(_))));
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero.toml");
        std::fs::write(&path, "message_capacity = 0").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigFileError::Invalid {
                field: "message_capacity",
                ..
            })
        ));
    }
}
