use std::time::Duration;

use idvault_repo::config::require_at_least;
use idvault_repo::ConfigError;
use serde::{Deserialize, Serialize};

/// Snapshot refresh loop settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

impl RefreshSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_at_least("refresh.interval_secs", self.interval_secs, 1)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Expired grant cleanup loop settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Grants fetched per `get_expired` call.
    pub batch_size: usize,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            batch_size: 100,
        }
    }
}

impl CleanupSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_at_least("cleanup.interval_secs", self.interval_secs, 1)?;
        require_at_least("cleanup.batch_size", self.batch_size as u64, 1)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
