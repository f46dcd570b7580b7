use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::hashed_key::{HashedKey, KeyHasher};
use crate::validation::validate_key;

/// The kinds of record idvault persists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Client,
    ApiResource,
    ApiScope,
    IdentityResource,
    PersistedGrant,
    DeviceFlowCode,
    SigningKey,
}

impl EntityKind {
    /// Every kind, in declaration order.
    pub const ALL: [EntityKind; 7] = [
        Self::Client,
        Self::ApiResource,
        Self::ApiScope,
        Self::IdentityResource,
        Self::PersistedGrant,
        Self::DeviceFlowCode,
        Self::SigningKey,
    ];

    /// Stable kebab-case name, also accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::ApiResource => "api-resource",
            Self::ApiScope => "api-scope",
            Self::IdentityResource => "identity-resource",
            Self::PersistedGrant => "persisted-grant",
            Self::DeviceFlowCode => "device-flow-code",
            Self::SigningKey => "signing-key",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownKind(s.to_string()))
    }
}

/// A record addressed by a single logical key.
///
/// Repositories store one object per entity at `HashedKey::of(entity.key())`;
/// the last write for a key wins.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The kind tag, used in logs and errors.
    const KIND: EntityKind;

    /// The logical key identifying this record.
    fn key(&self) -> &str;

    /// Check the record before it is written.
    ///
    /// The default only requires a non-blank key.
    fn validate(&self) -> Result<(), ValidationError> {
        validate_key(Self::KIND, self.key())
    }

    /// Storage address of this record.
    fn hashed_key(&self) -> HashedKey {
        KeyHasher::hash(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert_eq!(" Api-Scope ".parse::<EntityKind>().unwrap(), EntityKind::ApiScope);
        assert!("grant".parse::<EntityKind>().is_err());
    }

    #[test]
    fn serde_matches_display() {
        let json = serde_json::to_string(&EntityKind::DeviceFlowCode).unwrap();
        assert_eq!(json, "\"device-flow-code\"");
    }
}
