//! Repositories for idvault.
//!
//! Each entity kind is stored as one object per logical key in its own
//! container, addressed by [`HashedKey`](idvault_types::HashedKey). Reads of
//! the full collection are served from a snapshot cache. Persisted grants
//! and API resources additionally keep secondary index rows in a table
//! store:
//!
//! - grants are indexed by key and by subject ([`PersistedGrantStore`]);
//! - API resources are indexed by scope ([`ApiResourceStore`]).
//!
//! Writes that touch several artifacts are not transactional. A partial
//! failure is reported as [`RepoError::Partial`] and is repaired by the
//! next write of the same key.

mod clients;
pub mod config;
mod devices;
pub mod error;
mod fanout;
pub mod grants;
pub mod repository;
pub mod resources;
pub mod vault;

pub use config::{CachedContainerConfig, ConfigError, ContainerConfig, StorageConfig};
pub use error::{RepoError, RepoResult};
pub use grants::PersistedGrantStore;
pub use repository::{EntityRepository, RefreshReport, SnapshotRefresh};
pub use resources::{ApiResourceStore, Resources};
pub use vault::IdVault;
