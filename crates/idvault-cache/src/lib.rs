//! Snapshot cache for idvault repositories.
//!
//! A snapshot is a single object holding the full serialized listing of a
//! container. Snapshot names encode their creation time in descending order,
//! so the lexicographically smallest name in the cache container is the
//! latest snapshot and every larger name is stale.
//!
//! ```text
//! clientcache/
//!   18446742337195217615   <- latest (smallest)
//!   18446742337195217993   <- stale, removed by prune
//! ```
//!
//! The cache is eventually consistent: any read failure is reported as a
//! miss so callers can always fall back to a full listing.

pub mod clock;
pub mod snapshot;

pub use clock::SnapshotClock;
pub use snapshot::{SnapshotCache, SnapshotId, SnapshotStats};
