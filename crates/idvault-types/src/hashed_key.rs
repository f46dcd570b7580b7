use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::ValidationError;

/// Length of a [`HashedKey`] in hex characters (160-bit digest).
pub const HASHED_KEY_LEN: usize = 40;

/// Storage address derived from a logical key.
///
/// A `HashedKey` is the lowercase hex SHA-1 of the trimmed, lowercased
/// logical key. It is used verbatim as an object name and as a table
/// partition or row key, so logical keys are never stored as addresses.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HashedKey(String);

impl HashedKey {
    /// Hash a logical key. Shorthand for [`KeyHasher::hash`].
    pub fn of(logical_key: &str) -> Self {
        KeyHasher::hash(logical_key)
    }

    /// The 40-character lowercase hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short hex representation (first 8 characters), for logs.
    pub fn short_hex(&self) -> &str {
        &self.0[..8]
    }

    /// Parse an already-hashed key, e.g. an object name read back from a listing.
    pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
        let well_formed = s.len() == HASHED_KEY_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(ValidationError::InvalidHashedKey(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Debug for HashedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashedKey({})", self.short_hex())
    }
}

impl fmt::Display for HashedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HashedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<HashedKey> for String {
    fn from(key: HashedKey) -> Self {
        key.0
    }
}

impl TryFrom<String> for HashedKey {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

/// Deterministic, case-insensitive key hasher.
///
/// `hash(a) == hash(b)` iff `trim(lower(a)) == trim(lower(b))`. The empty
/// string is a valid input and hashes like any other.
pub struct KeyHasher;

impl KeyHasher {
    /// Normalize a logical key before hashing.
    pub fn normalize(logical_key: &str) -> String {
        logical_key.trim().to_lowercase()
    }

    /// Hash a logical key into its storage address.
    pub fn hash(logical_key: &str) -> HashedKey {
        let digest = Sha1::digest(Self::normalize(logical_key).as_bytes());
        HashedKey(hex::encode(digest))
    }
}
