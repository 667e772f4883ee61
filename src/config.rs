use crate::logging::{LogLevel, LogRotationPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Runtime configuration for a sessionization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionizerConfig {
    /// Seconds of inactivity after which a session closes.
    pub inactivity_period_s: f64,
    /// Log and skip unparseable records instead of aborting the run.
    #[serde(default)]
    pub skip_malformed_records: bool,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub log_rotation: LogRotationPolicy,
}

impl SessionizerConfig {
    pub fn new(inactivity_period_s: f64) -> Self {
        Self {
            inactivity_period_s,
            skip_malformed_records: false,
            log_level: LogLevel::default(),
            log_rotation: LogRotationPolicy::default(),
        }
    }

    /// Parses a JSON config document and validates it.
    pub fn from_json_str(payload: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let payload = read(path)?;
        Self::from_json_str(&payload)
    }

    /// Reads a plain-text file holding only the inactivity period in seconds.
    pub fn from_inactivity_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let payload = read(path)?;
        let trimmed = payload.trim();
        let period = trimmed
            .parse::<f64>()
            .map_err(|_| ConfigError::InvalidInactivityPeriod(trimmed.to_string()))?;
        let config = Self::new(period);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.inactivity_period_s.is_finite() || self.inactivity_period_s <= 0.0 {
            return Err(ConfigError::InvalidInactivityPeriod(
                self.inactivity_period_s.to_string(),
            ));
        }
        Ok(())
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("inactivity period must be a positive number of seconds, got {0:?}")]
    InvalidInactivityPeriod(String),
}
