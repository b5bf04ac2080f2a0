use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::emit::channel::ChannelOptions;
use crate::naming::NamingBudget;
use crate::target::Target;
use crate::typ::ParseOptions;

pub const DEFAULT_MAX_IDENTIFIER_LEN: usize = 32;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u32 = 5000;
pub const DEFAULT_ANNOUNCE_INTERVAL_MS: u32 = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("parse config {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid config field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Everything a generation run depends on besides the type source.
///
/// Naming budgets live here rather than in process-wide state so two runs with
/// the same config always agree on derived names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    pub target: Target,
    /// Overrides the target's library-name budget.
    pub library_name_len: Option<usize>,
    pub max_identifier_len: usize,
    pub handshake_timeout_ms: u32,
    pub announce_interval_ms: u32,
    /// Also write `<Type>.layout.json` into the component root.
    pub emit_layout_json: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            target: Target::default(),
            library_name_len: None,
            max_identifier_len: DEFAULT_MAX_IDENTIFIER_LEN,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            announce_interval_ms: DEFAULT_ANNOUNCE_INTERVAL_MS,
            emit_layout_json: false,
        }
    }
}

impl GeneratorConfig {
    pub fn for_target(target: Target) -> Self {
        GeneratorConfig {
            target,
            ..GeneratorConfig::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let cfg: GeneratorConfig =
            serde_json::from_slice(&bytes).map_err(|err| ConfigError::Parse {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.library_name_len == Some(0) {
            return Err(ConfigError::Invalid {
                field: "library_name_len",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_identifier_len == 0 {
            return Err(ConfigError::Invalid {
                field: "max_identifier_len",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "handshake_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.announce_interval_ms == 0 || self.announce_interval_ms > self.handshake_timeout_ms
        {
            return Err(ConfigError::Invalid {
                field: "announce_interval_ms",
                reason: format!(
                    "must be in 1..={} (the handshake timeout)",
                    self.handshake_timeout_ms
                ),
            });
        }
        Ok(())
    }

    pub fn naming_budget(&self) -> NamingBudget {
        let default = self.target.default_budget();
        match self.library_name_len {
            Some(len) if len != default.library_name_len => {
                tracing::warn!(
                    generation_target = %self.target,
                    default_len = default.library_name_len,
                    override_len = len,
                    "library name budget overrides the target default"
                );
                NamingBudget::new(len)
            }
            _ => default,
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            max_identifier_len: self.max_identifier_len,
        }
    }

    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            handshake_timeout_ms: self.handshake_timeout_ms,
            announce_interval_ms: self.announce_interval_ms,
        }
    }
}
