use idvault_store::StoreError;
use idvault_types::{EntityKind, ValidationError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    /// A single storage operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The record was rejected before any write.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A stored record could not be decoded.
    #[error("corrupt {kind} record {key}: {reason}")]
    Corrupt {
        kind: EntityKind,
        key: String,
        reason: String,
    },

    /// Some sub-operations of a fan-out write or delete failed. The ones that
    /// succeeded are not rolled back.
    #[error("{operation}: {} of {total} sub-operations failed", .failures.len())]
    Partial {
        operation: &'static str,
        total: usize,
        failures: Vec<StoreError>,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RepoError {
    /// Whether retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(err) => err.is_transient(),
            Self::Partial { failures, .. } => failures.iter().all(StoreError::is_transient),
            _ => false,
        }
    }
}

/// Result alias for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;
