//! Application configuration file.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/dosetap/config.toml`.
//! Every section and field is optional; missing values take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ValidationError;
use crate::queue::RetryQueueConfig;
use crate::rate_limit::RateLimiterConfig;
use crate::session::SessionLifecycleConfig;
use crate::types::DoseWindowConfig;
use crate::undo::UndoConfig;

/// Errors raised while loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform has no config directory
    #[error("could not determine the configuration directory")]
    NoConfigDir,

    /// File could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for [`AppConfig`]
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// Configuration could not be serialized
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Values parsed but violate an invariant
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Aggregate configuration for every engine component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    /// Dosing window
    #[serde(default)]
    pub dose_window: DoseWindowConfig,

    /// Undo window
    #[serde(default)]
    pub undo: UndoConfig,

    /// Retry queue
    #[serde(default)]
    pub retry_queue: RetryQueueConfig,

    /// Event cooldowns
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,

    /// Session boundaries
    #[serde(default)]
    pub session: SessionLifecycleConfig,
}

impl AppConfig {
    /// Loads from the default path, falling back to defaults when absent.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Loads and validates the file at `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(io_error)?;
        tracing::info!(path = %path.display(), "saved config");
        Ok(())
    }

    /// `$XDG_CONFIG_HOME/dosetap/config.toml` or the platform equivalent.
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|base| base.join("dosetap").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.dose_window.validate()?;
        self.retry_queue.validate()?;
        self.session.validate()
    }

    /// Pretty TOML rendering, used by `dosetap config`.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.dose_window.min_interval_minutes, 150);
        assert_eq!(config.undo.window_seconds, 5);
        assert_eq!(config.retry_queue.max_retries, 3);
        assert_eq!(config.session.rollover_hour, 18);
        assert_eq!(config.rate_limiter.cooldowns.get("bathroom"), Some(&60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config() {
        let config: AppConfig = toml::from_str(
            r#"
[dose_window]
max_interval_minutes = 230

[session]
rollover_hour = 17
prep_time_minutes = 1290
"#,
        )
        .unwrap();

        assert_eq!(config.dose_window.max_interval_minutes, 230);
        assert_eq!(config.dose_window.min_interval_minutes, 150);
        assert_eq!(config.session.rollover_hour, 17);
        assert_eq!(config.session.prep_time_minutes, Some(1290));
        assert_eq!(config.undo, UndoConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.session = config.session.with_prep_time(21, 0);
        config.rate_limiter = config.rate_limiter.with_cooldown("water", 120);
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session]\nrollover_hour = 25\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dose_window\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_window_invariant_checked() {
        let mut config = AppConfig::default();
        config.dose_window.min_interval_minutes = 240;
        assert!(config.validate().is_err());
    }
}
