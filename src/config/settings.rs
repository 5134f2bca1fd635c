//! Application settings

use crate::core::logger::{generate_log_filename, LogFormat};
use crate::core::session::SessionConfig;
use crate::core::transport::DEFAULT_BAUD_RATE;
use crate::core::watchdog::DEFAULT_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No configuration directory on this platform
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Reading or writing the file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serialization failed
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending key
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Modem settings
    pub modem: ModemConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load config from the default location, or defaults when absent
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate config from a file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        self.save_to(&path)
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.modem.validate()
    }
}

/// Modem connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// Serial port name
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Watchdog deadline in seconds
    pub watchdog_secs: u64,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            watchdog_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ModemConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "modem.port",
                reason: "must not be empty".to_string(),
            });
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "modem.baud_rate",
                reason: "must be positive".to_string(),
            });
        }
        if self.watchdog_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "modem.watchdog_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }

    /// Build the session configuration
    pub fn session(&self) -> SessionConfig {
        SessionConfig::new(&self.port)
            .baud_rate(self.baud_rate)
            .watchdog_timeout(Duration::from_secs(self.watchdog_secs))
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    pub level: String,
    /// File receiving every fix, if any
    pub fix_log: Option<PathBuf>,
    /// Fix log format
    pub format: LogFormat,
}

impl LoggingConfig {
    /// File receiving fixes. A directory gets a fresh timestamped file.
    pub fn fix_log_path(&self) -> Option<PathBuf> {
        let path = self.fix_log.as_ref()?;
        if path.is_dir() {
            Some(path.join(generate_log_filename("fixes", self.format)))
        } else {
            Some(path.clone())
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            fix_log: None,
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.modem.port, "/dev/ttyACM0");
        assert_eq!(config.modem.baud_rate, 115_200);
        assert_eq!(config.modem.watchdog_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.modem.port = "/dev/ttyACM3".to_string();
        config.modem.watchdog_secs = 15;
        config.logging.fix_log = Some(dir.path().join("fixes.csv"));
        config.logging.format = LogFormat::Csv;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[modem]\nport = \"COM4\"\n").unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.modem.port, "COM4");
        assert_eq!(loaded.modem.baud_rate, 115_200);
        assert_eq!(loaded.logging, LoggingConfig::default());
    }

    #[test]
    fn test_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        for body in [
            "[modem]\nport = \"\"\n",
            "[modem]\nbaud_rate = 0\n",
            "[modem]\nwatchdog_secs = 0\n",
        ] {
            std::fs::write(&path, body).unwrap();
            assert!(matches!(
                AppConfig::load_from(&path),
                Err(ConfigError::Invalid { .. })
            ));
        }
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[modem\n").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_fix_log_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut logging = LoggingConfig::default();
        assert_eq!(logging.fix_log_path(), None);

        let file = dir.path().join("fixes.txt");
        logging.fix_log = Some(file.clone());
        assert_eq!(logging.fix_log_path(), Some(file));

        logging.fix_log = Some(dir.path().to_path_buf());
        logging.format = LogFormat::Csv;
        let generated = logging.fix_log_path().unwrap();
        assert_eq!(generated.parent(), Some(dir.path()));
        let name = generated.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("fixes_"));
        assert!(name.ends_with(".csv"));
    }

    #[test]
    fn test_session_config() {
        let modem = ModemConfig {
            port: "/dev/ttyACM2".to_string(),
            baud_rate: 9600,
            watchdog_secs: 5,
        };
        let session = modem.session();
        assert_eq!(session.port, "/dev/ttyACM2");
        assert_eq!(session.baud_rate, 9600);
        assert_eq!(session.watchdog_timeout, Duration::from_secs(5));
    }
}
