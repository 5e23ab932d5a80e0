//! Engine configuration
//!
//! Handles loading and validating engine settings using the config crate.

use std::path::{Path, PathBuf};

use config::{Config as ConfigBuilder, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

use crate::types::ExecutionSettings;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../vitrine.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for the execution engine
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock budget for a single execution, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Guest heap ceiling per execution, in bytes.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,

    /// Maximum number of concurrently executing sessions.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Maximum nesting depth when dumping a guest result to a host value.
    #[serde(default = "default_max_result_depth")]
    pub max_result_depth: usize,
}

impl EngineConfig {
    /// Create a config with the built-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: EngineConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: EngineConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve effective per-request settings: config defaults → user overrides
    pub fn effective_settings(&self, overrides: Option<&ExecutionSettings>) -> ExecutionSettings {
        let base = ExecutionSettings {
            timeout_ms: Some(self.timeout_ms),
            memory_limit: Some(self.memory_limit),
        };
        match overrides {
            Some(settings) => base.with_overrides(settings),
            None => base,
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".into()));
        }
        if self.memory_limit == 0 {
            return Err(ConfigError::Invalid("memory_limit must be positive".into()));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be positive".into()));
        }
        if self.max_result_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_result_depth must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_memory_limit() -> usize {
    32 * 1024 * 1024
}

fn default_max_workers() -> usize {
    8
}

fn default_max_result_depth() -> usize {
    32
}
