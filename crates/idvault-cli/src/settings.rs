use std::path::{Path, PathBuf};

use anyhow::Context;
use idvault_repo::{ConfigError, StorageConfig};
use idvault_scheduler::{CleanupSettings, RefreshSettings};
use serde::{Deserialize, Serialize};

/// Contents of the `idvault` TOML configuration file.
///
/// `[storage]` is required in a file; the loop sections fall back to their
/// defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    pub storage: StorageConfig,
    #[serde(default)]
    pub refresh: RefreshSettings,
    #[serde(default)]
    pub cleanup: CleanupSettings,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("idvault-data")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage: StorageConfig::default(),
            refresh: RefreshSettings::default(),
            cleanup: CleanupSettings::default(),
        }
    }
}

impl AppConfig {
    /// Read and validate `path`, or validate the defaults when `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::parse(&text).with_context(|| format!("loading config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate()?;
        self.refresh.validate()?;
        self.cleanup.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = include_str!("../idvault.toml");

    #[test]
    fn sample_config_loads() {
        let config = AppConfig::parse(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.storage.persisted_grants.table, "persistedgrants");
        assert_eq!(config.cleanup.batch_size, 100);
    }

    #[test]
    fn storage_section_is_required() {
        let err = AppConfig::parse("data_dir = \"/tmp/x\"\n").unwrap_err();
        assert!(err.to_string().contains("storage"));
    }

    #[test]
    fn loop_sections_default() {
        let text = SAMPLE
            .split("[refresh]")
            .next()
            .unwrap();
        let config = AppConfig::parse(text).unwrap();
        assert_eq!(config.refresh, RefreshSettings::default());
        assert_eq!(config.cleanup, CleanupSettings::default());
    }

    #[test]
    fn zero_interval_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idvault.toml");
        std::fs::write(&path, SAMPLE.replace("interval_secs = 300", "interval_secs = 0")).unwrap();
        let err = AppConfig::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("refresh.interval_secs"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(AppConfig::load(Some(Path::new("/definitely/not/here.toml"))).is_err());
        assert!(AppConfig::load(None).is_ok());
    }
}
