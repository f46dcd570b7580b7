use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Secret type used when none is given.
pub const SHARED_SECRET: &str = "SharedSecret";

/// A client or API secret. Values are stored as given (usually pre-hashed by the host).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default = "default_secret_type", rename = "type")]
    pub secret_type: String,
}

fn default_secret_type() -> String {
    SHARED_SECRET.to_string()
}

impl Secret {
    /// A non-expiring shared secret.
    pub fn shared(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: None,
            expiration: None,
            secret_type: default_secret_type(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|exp| exp <= now)
    }
}
