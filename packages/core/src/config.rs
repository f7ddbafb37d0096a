//! Engine configuration
//!
//! `EngineConfig` collects the knobs the engine and its helpers read at
//! construction time. Every field has a serde default so partial JSON files
//! (or none at all) deserialize without error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Upper bound on exponential backoff steps to keep retry delays sane
const MAX_SUPPORTED_RETRIES: u32 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Retry policy used by `ConflictRetryQueue`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = single attempt)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff step; doubles on every retry
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    10
}

/// Configuration for `OutlineService`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Primary text of nodes created through the "add child" affordance
    #[serde(default = "default_placeholder_content")]
    pub placeholder_content: String,

    /// Alternate text of nodes created through the "add child" affordance
    #[serde(default = "default_placeholder_content_alt")]
    pub placeholder_content_alt: String,

    /// Primary text of the root node seeded into an empty outline
    #[serde(default = "default_welcome_content")]
    pub welcome_content: String,

    /// Alternate text of the seeded root node
    #[serde(default = "default_welcome_content_alt")]
    pub welcome_content_alt: String,

    /// Write `is_expanded = true` on the parent in the same batch as a create
    #[serde(default)]
    pub expand_parent_on_create: bool,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Broadcast channel capacity for domain events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            placeholder_content: default_placeholder_content(),
            placeholder_content_alt: default_placeholder_content_alt(),
            welcome_content: default_welcome_content(),
            welcome_content_alt: default_welcome_content_alt(),
            expand_parent_on_create: false,
            retry: RetryConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_placeholder_content() -> String {
    "New node".to_string()
}

fn default_placeholder_content_alt() -> String {
    "新节点".to_string()
}

fn default_welcome_content() -> String {
    "Welcome to roam-sepulture".to_string()
}

fn default_welcome_content_alt() -> String {
    "欢迎使用 roam-sepulture".to_string()
}

fn default_event_channel_capacity() -> usize {
    128
}

impl EngineConfig {
    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults; a present file is parsed and
    /// validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_retries > MAX_SUPPORTED_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "retry.max_retries cannot exceed {}",
                MAX_SUPPORTED_RETRIES
            )));
        }

        if self.welcome_content.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "welcome_content cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
