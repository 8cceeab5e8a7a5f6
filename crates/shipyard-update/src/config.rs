//! Update engine configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, UpdateError};

/// Configuration for the update engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateConfig {
    /// Package database directory.
    #[serde(default = "UpdateConfig::default_data_dir")]
    pub data_dir: PathBuf,

    /// Root directory packages are unpacked under.
    #[serde(default = "UpdateConfig::default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Maximum phases executed concurrently by one step.
    #[serde(default = "UpdateConfig::default_max_concurrent_phases")]
    pub max_concurrent_phases: usize,

    /// Maximum concurrent node operations within one phase.
    #[serde(default = "UpdateConfig::default_node_parallelism")]
    pub node_parallelism: usize,

    /// Phase execution timeout in seconds.
    #[serde(default = "UpdateConfig::default_phase_timeout")]
    pub phase_timeout_seconds: u64,
}

impl UpdateConfig {
    fn default_data_dir() -> PathBuf {
        PathBuf::from("/var/lib/shipyard")
    }

    fn default_storage_dir() -> PathBuf {
        PathBuf::from("/var/lib/shipyard/unpacked")
    }

    const fn default_max_concurrent_phases() -> usize {
        4
    }

    const fn default_node_parallelism() -> usize {
        8
    }

    const fn default_phase_timeout() -> u64 {
        1800 // 30 minutes
    }

    /// Get the phase timeout as a `Duration`.
    #[must_use]
    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_seconds)
    }

    /// Load configuration from `SHIPYARD_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::Config` if a variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::Config` if a value does not parse or a limit is
    /// zero.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            data_dir: lookup("SHIPYARD_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            storage_dir: lookup("SHIPYARD_STORAGE_DIR").map_or(defaults.storage_dir, PathBuf::from),
            max_concurrent_phases: parse(&lookup, "SHIPYARD_MAX_CONCURRENT_PHASES", defaults.max_concurrent_phases)?,
            node_parallelism: parse(&lookup, "SHIPYARD_NODE_PARALLELISM", defaults.node_parallelism)?,
            phase_timeout_seconds: parse(&lookup, "SHIPYARD_PHASE_TIMEOUT_SECONDS", defaults.phase_timeout_seconds)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check limits.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::Config` if a limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_phases == 0 {
            return Err(UpdateError::Config("max_concurrent_phases must be at least 1".to_string()));
        }
        if self.node_parallelism == 0 {
            return Err(UpdateError::Config("node_parallelism must be at least 1".to_string()));
        }
        if self.phase_timeout_seconds == 0 {
            return Err(UpdateError::Config("phase_timeout_seconds must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| UpdateError::Config(format!("{key}={value:?}: {e}"))),
        None => Ok(default),
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            storage_dir: Self::default_storage_dir(),
            max_concurrent_phases: Self::default_max_concurrent_phases(),
            node_parallelism: Self::default_node_parallelism(),
            phase_timeout_seconds: Self::default_phase_timeout(),
        }
    }
}
