//! Configuration for Strata and global tracing setup.
//!
//! Everything is optional in TOML; a missing table or key takes its default.
//! Configuration is handed explicitly to the workspace; nothing here is read
//! from global state except `RUST_LOG`, which is merged into the log filter.

mod logging;
mod workspace;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use logging::{init_tracing, LoggingConfig, RecentLogs};
pub use workspace::{LoadMode, WorkspaceConfig};

/// Top-level configuration, usually read from `strata.toml`.
///
/// ```toml
/// [logging]
/// level = "debug"
///
/// [workspace]
/// workspace_files = ["**/strata.work"]
/// mode = "adhoc"
///
/// [cache]
/// dir = "/var/cache/strata"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrataConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Artifact cache location. Without a directory artifacts are kept in memory
/// only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid glob pattern {pattern:?}: {message}")]
    InvalidGlob { pattern: String, message: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // `Display` would include a snippet of the input; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl StrataConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: StrataConfig = toml::from_str(text)?;
        config.workspace.validate()?;
        Ok(config)
    }
}
