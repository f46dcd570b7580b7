//! Storage configuration.
//!
//! Container and table names are required. A missing section is a
//! deserialization error and a blank name is rejected by
//! [`StorageConfig::validate`], so both fail at startup.

use idvault_store::validate_name;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CLIENT_CACHE: &str = "clientcache";
pub const DEFAULT_API_RESOURCE_CACHE: &str = "apiresourcecache";
pub const DEFAULT_API_SCOPE_CACHE: &str = "apiscopecache";
pub const DEFAULT_IDENTITY_RESOURCE_CACHE: &str = "identityresourcecache";
pub const DEFAULT_DEVICE_CODE_CACHE: &str = "devicecodecache";
pub const DEFAULT_SIGNING_KEY_CACHE: &str = "signingkeycache";

/// Errors raised while validating configuration. Never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{setting} must not be blank")]
    Blank { setting: String },

    #[error("{setting}: invalid name {value:?}: {reason}")]
    InvalidName {
        setting: String,
        value: String,
        reason: String,
    },

    #[error("{setting} must be at least {min}, got {value}")]
    OutOfRange {
        setting: String,
        min: u64,
        value: u64,
    },

    #[error("{first} and {second} must name different containers, both are {value:?}")]
    Conflict {
        first: String,
        second: String,
        value: String,
    },
}

/// Check that `value` is a usable container or table name.
pub fn require_name(setting: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Blank {
            setting: setting.to_string(),
        });
    }
    validate_name(value).map_err(|err| ConfigError::InvalidName {
        setting: setting.to_string(),
        value: value.to_string(),
        reason: err.to_string(),
    })
}

/// Check that `value >= min`.
pub fn require_at_least(setting: &str, value: u64, min: u64) -> Result<(), ConfigError> {
    if value < min {
        return Err(ConfigError::OutOfRange {
            setting: setting.to_string(),
            min,
            value,
        });
    }
    Ok(())
}

/// An object container paired with an index table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub container: String,
    pub table: String,
}

impl ContainerConfig {
    pub fn new(container: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            table: table.into(),
        }
    }

    pub fn validate(&self, section: &str) -> Result<(), ConfigError> {
        require_name(&format!("{section}.container"), &self.container)?;
        require_name(&format!("{section}.table"), &self.table)
    }
}

/// An object container with a snapshot cache container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedContainerConfig {
    pub container: String,
    /// Falls back to the per-kind default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_container: Option<String>,
}

impl CachedContainerConfig {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            cache_container: None,
        }
    }

    pub fn with_cache(mut self, cache_container: impl Into<String>) -> Self {
        self.cache_container = Some(cache_container.into());
        self
    }

    pub fn cache_container_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.cache_container.as_deref().unwrap_or(default)
    }

    pub fn validate(&self, section: &str, default_cache: &str) -> Result<(), ConfigError> {
        require_name(&format!("{section}.container"), &self.container)?;
        let cache = self.cache_container_or(default_cache);
        require_name(&format!("{section}.cache_container"), cache)?;
        if cache == self.container {
            return Err(ConfigError::Conflict {
                first: format!("{section}.container"),
                second: format!("{section}.cache_container"),
                value: cache.to_string(),
            });
        }
        Ok(())
    }
}

/// Names of every container and table used by [`IdVault`](crate::IdVault).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub clients: CachedContainerConfig,
    pub api_resources: CachedContainerConfig,
    /// Table holding the scope -> resource index.
    pub api_resource_scope_table: String,
    pub api_scopes: CachedContainerConfig,
    pub identity_resources: CachedContainerConfig,
    pub persisted_grants: ContainerConfig,
    pub device_codes: CachedContainerConfig,
    pub signing_keys: CachedContainerConfig,
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.clients.validate("clients", DEFAULT_CLIENT_CACHE)?;
        self.api_resources
            .validate("api_resources", DEFAULT_API_RESOURCE_CACHE)?;
        require_name("api_resource_scope_table", &self.api_resource_scope_table)?;
        self.api_scopes.validate("api_scopes", DEFAULT_API_SCOPE_CACHE)?;
        self.identity_resources
            .validate("identity_resources", DEFAULT_IDENTITY_RESOURCE_CACHE)?;
        self.persisted_grants.validate("persisted_grants")?;
        self.device_codes
            .validate("device_codes", DEFAULT_DEVICE_CODE_CACHE)?;
        self.signing_keys
            .validate("signing_keys", DEFAULT_SIGNING_KEY_CACHE)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            clients: CachedContainerConfig::new("clients"),
            api_resources: CachedContainerConfig::new("apiresources"),
            api_resource_scope_table: "apiresourcescopes".to_string(),
            api_scopes: CachedContainerConfig::new("apiscopes"),
            identity_resources: CachedContainerConfig::new("identityresources"),
            persisted_grants: ContainerConfig::new("persistedgrants", "persistedgrants"),
            device_codes: CachedContainerConfig::new("devicecodes"),
            signing_keys: CachedContainerConfig::new("signingkeys"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        StorageConfig::default().validate().unwrap();
    }

    #[test]
    fn blank_container_is_rejected() {
        let mut config = StorageConfig::default();
        config.clients.container = "  ".into();
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::Blank {
                setting: "clients.container".into()
            }
        );
    }

    #[test]
    fn cache_defaults_per_kind() {
        let config = StorageConfig::default();
        assert_eq!(config.clients.cache_container_or(DEFAULT_CLIENT_CACHE), "clientcache");
        let custom = CachedContainerConfig::new("clients").with_cache("mycache");
        assert_eq!(custom.cache_container_or(DEFAULT_CLIENT_CACHE), "mycache");
    }

    #[test]
    fn cache_must_differ_from_container() {
        let config = CachedContainerConfig::new("clients").with_cache("clients");
        assert!(matches!(
            config.validate("clients", DEFAULT_CLIENT_CACHE),
            Err(ConfigError::Conflict { .. })
        ));
    }

    #[test]
    fn unsafe_names_are_rejected() {
        let mut config = StorageConfig::default();
        config.persisted_grants.table = "../grants".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidName { .. })
        ));
    }

    #[test]
    fn range_check() {
        assert!(require_at_least("interval_secs", 1, 1).is_ok());
        assert_eq!(
            require_at_least("interval_secs", 0, 1).unwrap_err().to_string(),
            "interval_secs must be at least 1, got 0"
        );
    }
}
