use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityKind};
use crate::error::ValidationError;
use crate::validation::validate_key;

/// Serialized signing key material, as produced by the host's key manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningKeyRecord {
    pub id: String,
    pub version: u32,
    pub created: DateTime<Utc>,
    pub algorithm: String,
    #[serde(default)]
    pub is_x509_certificate: bool,
    pub data: String,
    #[serde(default)]
    pub data_protected: bool,
}

impl Entity for SigningKeyRecord {
    const KIND: EntityKind = EntityKind::SigningKey;

    fn key(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_key(Self::KIND, &self.id)?;
        if self.algorithm.trim().is_empty() || self.data.is_empty() {
            return Err(ValidationError::Invalid {
                kind: Self::KIND,
                key: self.id.clone(),
                reason: "algorithm and key data are required".into(),
            });
        }
        Ok(())
    }
}
