use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};

/// Longest accepted container, object, partition or row name.
pub const MAX_NAME_LEN: usize = 255;

/// Blob-like store of named objects grouped in containers.
///
/// Implementations must satisfy these invariants:
/// - `get` of an absent object returns `Ok(None)`.
/// - `put` overwrites any existing object with the same name.
/// - `delete` is idempotent; deleting an absent object is `Ok(false)`.
/// - Operations on a container that was never created fail with
///   [`StoreError::ContainerNotFound`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create a container. Creating an existing container is a no-op.
    async fn create_container(&self, container: &str) -> StoreResult<()>;

    /// Read an object by name.
    async fn get(&self, container: &str, name: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write an object, replacing any previous content.
    async fn put(&self, container: &str, name: &str, data: Vec<u8>) -> StoreResult<()>;

    /// Delete an object. Returns `true` if it existed.
    async fn delete(&self, container: &str, name: &str) -> StoreResult<bool>;

    /// Names of every object in the container, in ascending order.
    async fn list(&self, container: &str) -> StoreResult<Vec<String>>;
}

/// Check that `name` can be used as a container, object, partition or row
/// name on every backend: ASCII alphanumerics plus `-`, `_` and `.`, not
/// starting with `.`.
pub fn validate_name(name: &str) -> StoreResult<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.len() > MAX_NAME_LEN {
        Some("name is too long")
    } else if name.starts_with('.') {
        Some("name starts with '.'")
    } else if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    {
        Some("name contains characters outside [A-Za-z0-9._-]")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(StoreError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
