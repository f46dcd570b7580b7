use thiserror::Error;

use crate::entity::EntityKind;

/// Errors produced when a record or key fails validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{kind} key must not be blank")]
    BlankKey { kind: EntityKind },

    #[error("{kind} {key}: {field} contains a blank entry")]
    BlankEntry {
        kind: EntityKind,
        key: String,
        field: &'static str,
    },

    #[error("{kind} {key}: duplicate {field} entry {value:?}")]
    DuplicateEntry {
        kind: EntityKind,
        key: String,
        field: &'static str,
        value: String,
    },

    #[error("{kind} {key}: {reason}")]
    Invalid {
        kind: EntityKind,
        key: String,
        reason: String,
    },

    #[error("invalid hashed key: {0}")]
    InvalidHashedKey(String),

    #[error("unknown entity kind: {0}")]
    UnknownKind(String),
}
