use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityKind};
use crate::error::ValidationError;
use crate::validation::{validate_key, validate_names};

/// A pending or completed device authorization.
///
/// Addressed by `user_code`; `device_code` is a secondary lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFlowCode {
    pub user_code: String,
    pub device_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub creation_time: DateTime<Utc>,
    /// Seconds.
    pub lifetime: u32,
    #[serde(default)]
    pub is_open_id: bool,
    #[serde(default)]
    pub is_authorized: bool,
    #[serde(default)]
    pub requested_scopes: Vec<String>,
    #[serde(default)]
    pub authorized_scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl DeviceFlowCode {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.creation_time + Duration::seconds(i64::from(self.lifetime))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() <= now
    }
}

impl Entity for DeviceFlowCode {
    const KIND: EntityKind = EntityKind::DeviceFlowCode;

    fn key(&self) -> &str {
        &self.user_code
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_key(Self::KIND, &self.user_code)?;
        let invalid = |reason: &str| ValidationError::Invalid {
            kind: Self::KIND,
            key: self.user_code.clone(),
            reason: reason.to_string(),
        };
        if self.device_code.trim().is_empty() {
            return Err(invalid("device code must not be blank"));
        }
        if self.client_id.trim().is_empty() {
            return Err(invalid("client id must not be blank"));
        }
        if self.lifetime == 0 {
            return Err(invalid("lifetime must be positive"));
        }
        validate_names(
            Self::KIND,
            &self.user_code,
            "requested_scopes",
            &self.requested_scopes,
        )?;
        validate_names(
            Self::KIND,
            &self.user_code,
            "authorized_scopes",
            &self.authorized_scopes,
        )
    }
}
