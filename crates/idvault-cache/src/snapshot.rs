use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use idvault_store::{decode, encode, ObjectStore, StoreResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::SnapshotClock;

/// Width of a snapshot id: `u64::MAX` has 20 decimal digits.
const ID_WIDTH: usize = 20;

// ---------------------------------------------------------------------------
// SnapshotId
// ---------------------------------------------------------------------------

/// Time-descending snapshot name.
///
/// The id is `u64::MAX - created_micros`, zero-padded to 20 digits, so a
/// newer snapshot always sorts before an older one.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Id for a snapshot created at `micros` since the UNIX epoch.
    pub fn from_micros(micros: u64) -> Self {
        Self(format!("{:0width$}", u64::MAX - micros, width = ID_WIDTH))
    }

    /// Parse an object name; names that are not snapshot ids yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        if name.len() == ID_WIDTH && name.bytes().all(|b| b.is_ascii_digit()) {
            name.parse::<u64>().ok().map(|_| Self(name.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time in microseconds since the UNIX epoch.
    pub fn created_micros(&self) -> u64 {
        // Construction guarantees 20 digits that fit a u64.
        u64::MAX - self.0.parse::<u64>().unwrap_or(u64::MAX)
    }

    /// Whether `self` was created after `other`.
    pub fn is_newer_than(&self, other: &SnapshotId) -> bool {
        self < other
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({})", self.0)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Stored document
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SnapshotBody<'a, T> {
    created: DateTime<Utc>,
    count: usize,
    entities: &'a [T],
}

#[derive(Deserialize)]
struct SnapshotDocument<T> {
    entities: Vec<T>,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Point-in-time counters for one cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub hits: u64,
    pub misses: u64,
    pub rebuilds: u64,
    pub pruned: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    rebuilds: AtomicU64,
    pruned: AtomicU64,
}

// ---------------------------------------------------------------------------
// SnapshotCache
// ---------------------------------------------------------------------------

/// Builds, reads and garbage-collects snapshots in one cache container.
///
/// No lock is held across operations: concurrent rebuilds race and the
/// snapshot with the newest id wins as latest.
pub struct SnapshotCache {
    objects: Arc<dyn ObjectStore>,
    container: String,
    clock: SnapshotClock,
    counters: Counters,
}

impl SnapshotCache {
    pub fn new(objects: Arc<dyn ObjectStore>, container: impl Into<String>) -> Self {
        Self {
            objects,
            container: container.into(),
            clock: SnapshotClock::new(),
            counters: Counters::default(),
        }
    }

    /// The cache container this cache reads and writes.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Create the cache container if needed.
    pub async fn ensure_container(&self) -> StoreResult<()> {
        self.objects.create_container(&self.container).await
    }

    /// Id of the latest snapshot, if any.
    pub async fn latest_id(&self) -> StoreResult<Option<SnapshotId>> {
        let names = self.objects.list(&self.container).await?;
        Ok(names.iter().filter_map(|n| SnapshotId::parse(n)).min())
    }

    /// Read the latest snapshot.
    ///
    /// Returns `None` on a miss: no snapshot, a list or read failure, or an
    /// undecodable snapshot. Failures are logged, never returned, so the
    /// caller can always fall back to a full listing.
    pub async fn get_latest<T: DeserializeOwned>(&self) -> Option<Vec<T>> {
        let result = self.read_latest().await;
        match result {
            Ok(Some(entities)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entities)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(container = %self.container, "snapshot cache miss");
                None
            }
            Err(err) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                warn!(container = %self.container, error = %err, "snapshot read failed, treating as miss");
                None
            }
        }
    }

    async fn read_latest<T: DeserializeOwned>(&self) -> StoreResult<Option<Vec<T>>> {
        let Some(id) = self.latest_id().await? else {
            return Ok(None);
        };
        let Some(data) = self.objects.get(&self.container, id.as_str()).await? else {
            // Pruned between list and get.
            return Ok(None);
        };
        let document: SnapshotDocument<T> = decode(&data)?;
        debug!(
            container = %self.container,
            snapshot = %id,
            count = document.entities.len(),
            "snapshot cache hit"
        );
        Ok(Some(document.entities))
    }

    /// Write a new snapshot of `entities` and return its id.
    pub async fn rebuild<T: Serialize>(&self, entities: &[T]) -> StoreResult<SnapshotId> {
        let micros = self.clock.tick();
        let id = SnapshotId::from_micros(micros);
        let created = DateTime::<Utc>::from_timestamp_micros(micros as i64).unwrap_or_else(Utc::now);
        let body = SnapshotBody {
            created,
            count: entities.len(),
            entities,
        };
        let data = encode(&body)?;
        self.objects.put(&self.container, id.as_str(), data).await?;
        self.counters.rebuilds.fetch_add(1, Ordering::Relaxed);
        debug!(container = %self.container, snapshot = %id, count = entities.len(), "snapshot written");
        Ok(id)
    }

    /// Delete every snapshot older than `keep`.
    ///
    /// Deletes are independent: a failed delete is logged and the rest
    /// proceed. Returns the number of snapshots removed by this call.
    /// Objects that are not snapshots are left alone.
    pub async fn prune(&self, keep: &SnapshotId) -> StoreResult<usize> {
        let names = self.objects.list(&self.container).await?;
        let mut removed = 0;
        for id in names.iter().filter_map(|n| SnapshotId::parse(n)) {
            if id <= *keep {
                continue;
            }
            match self.objects.delete(&self.container, id.as_str()).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(container = %self.container, snapshot = %id, error = %err, "failed to prune snapshot");
                }
            }
        }
        self.counters.pruned.fetch_add(removed as u64, Ordering::Relaxed);
        if removed > 0 {
            info!(container = %self.container, kept = %keep, removed, "pruned stale snapshots");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            rebuilds: self.counters.rebuilds.load(Ordering::Relaxed),
            pruned: self.counters.pruned.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("container", &self.container)
            .field("stats", &self.stats())
            .finish()
    }
}
