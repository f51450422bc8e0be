//! Configuration loading for twin-cli.
//!
//! Configuration is loaded from a TOML file (default: `twin.toml` when it
//! exists in the working directory).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use twin_core::TwinOptions;

/// File picked up when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "twin.toml";

/// Root configuration for twin-cli.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Document features.
    #[serde(default)]
    pub twin: TwinOptions,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset (default: warn).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load `explicit` if given, else [`DEFAULT_CONFIG_FILE`] if present,
    /// else defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_is_minimal() {
        let config = Config::default();
        assert!(!config.twin.tags_enabled);
        assert!(!config.twin.metadata_enabled);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[twin]
tags_enabled = true
metadata_enabled = true

[logging]
level = "debug"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.twin.tags_enabled);
        assert!(config.twin.metadata_enabled);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: Config = toml::from_str("[twin]\ntags_enabled = true\n").unwrap();
        assert!(config.twin.tags_enabled);
        assert!(!config.twin.metadata_enabled);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn from_file_reports_path_on_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[twin]\ntags_enabled = \"yes\"").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("failed to parse config file"));

        let missing = Config::from_file(Path::new("/nonexistent/twin.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::ReadError { .. }));
    }
}
