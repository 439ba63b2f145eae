//! Runtime configuration.
//!
//! Which message types exist is decided in code by the embedding
//! application; this only tunes how frames are parsed and handlers are run.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::FrameLimits;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommyConfig {
    /// Limits applied to inbound frames and checked when building and sending.
    pub frame: FrameLimits,

    /// Run each handler on its own task (`true`) or inline (`false`).
    /// A panicking handler is reported as `HandlerError::Panicked` either way.
    pub isolate_panics: bool,

    /// Buffer size for in-memory inbound channels.
    pub inbound_capacity: usize,
}

impl Default for CommyConfig {
    fn default() -> Self {
        Self {
            frame: FrameLimits::default(),
            isolate_panics: true,
            inbound_capacity: 256,
        }
    }
}

impl CommyConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame.max_tag_len == 0 {
            return Err(ConfigError::Invalid("frame.max_tag_len must be > 0".into()));
        }
        if self.frame.max_body_len == 0 {
            return Err(ConfigError::Invalid("frame.max_body_len must be > 0".into()));
        }
        if self.inbound_capacity == 0 {
            return Err(ConfigError::Invalid("inbound_capacity must be > 0".into()));
        }
        Ok(())
    }
}
