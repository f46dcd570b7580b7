use std::fmt;

/// Errors from object and table store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The container was never created.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// The table was never created.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A container, table, object, partition or row name is not addressable.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The backend failed while serving a single operation.
    #[error("{operation} failed on {target}: {message}")]
    Backend {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from a filesystem backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// A backend failure for `operation` against `target` (e.g. `"clients/ab12.."`).
    pub fn backend(operation: &'static str, target: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Backend {
            operation,
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Whether retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Io(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
