use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use idvault_repo::SnapshotRefresh;
use tracing::{info, warn};

use crate::background::{BackgroundLoop, UnitOfWork};
use crate::error::{SchedulerError, SchedulerResult};

/// Rebuilds every target's snapshot from a full listing and prunes the
/// stale ones. A failing target does not stop the others.
pub struct CacheRefresh {
    targets: Vec<Arc<dyn SnapshotRefresh>>,
}

impl CacheRefresh {
    pub fn new(targets: Vec<Arc<dyn SnapshotRefresh>>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl UnitOfWork for CacheRefresh {
    fn name(&self) -> &'static str {
        "cache-refresh"
    }

    async fn run_once(&self) -> SchedulerResult<()> {
        let start = Instant::now();
        let mut failed = 0;
        let mut pruned = 0;
        for target in &self.targets {
            match target.refresh_snapshot().await {
                Ok(report) => pruned += report.pruned,
                Err(err) => {
                    failed += 1;
                    warn!(target = target.target(), error = %err, "snapshot refresh failed");
                }
            }
        }
        info!(
            targets = self.targets.len(),
            failed,
            pruned,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "cache refresh cycle complete"
        );
        if failed > 0 {
            return Err(SchedulerError::CycleFailed {
                work: self.name(),
                failed,
                total: self.targets.len(),
            });
        }
        Ok(())
    }
}

pub type CacheRefreshLoop = BackgroundLoop<CacheRefresh>;

#[cfg(test)]
mod tests {
    use super::*;
    use idvault_repo::{IdVault, StorageConfig};
    use idvault_store::{InMemoryObjectStore, InMemoryTableStore, ObjectStore};
    use idvault_types::Client;

    async fn vault(objects: Arc<InMemoryObjectStore>) -> IdVault {
        let vault = IdVault::new(
            &StorageConfig::default(),
            objects,
            Arc::new(InMemoryTableStore::new()),
        )
        .unwrap();
        vault.ensure_containers_exist().await.unwrap();
        vault
    }

    #[tokio::test]
    async fn refresh_leaves_one_snapshot_per_cache() {
        let objects = Arc::new(InMemoryObjectStore::new());
        let vault = vault(objects.clone()).await;
        for id in ["c1", "c2", "c3"] {
            vault.clients().store(Client::new(id)).await.unwrap();
        }
        assert_eq!(objects.object_count("clientcache"), 3);

        let refresh = CacheRefresh::new(vault.refresh_targets());
        refresh.run_once().await.unwrap();

        assert_eq!(objects.object_count("clientcache"), 1);
        assert_eq!(objects.object_count("apiscopecache"), 1);
        assert_eq!(vault.clients().find_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn refresh_picks_up_out_of_band_writes() {
        let objects = Arc::new(InMemoryObjectStore::new());
        let vault = vault(objects.clone()).await;
        vault.clients().store(Client::new("c1")).await.unwrap();
        // Written behind the repository's back: the snapshot does not know it.
        let other = IdVault::new(
            &StorageConfig::default(),
            objects.clone(),
            Arc::new(InMemoryTableStore::new()),
        )
        .unwrap();
        let c2 = Client::new("c2");
        objects
            .put(
                "clients",
                idvault_types::HashedKey::of("c2").as_str(),
                idvault_store::encode(&c2).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(other.clients().find_all().await.unwrap().len(), 1);

        CacheRefresh::new(vec![vault.clients().clone() as Arc<dyn SnapshotRefresh>]).run_once().await.unwrap();
        assert_eq!(other.clients().find_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn one_failing_target_fails_the_cycle_not_the_rest() {
        let objects = Arc::new(InMemoryObjectStore::new());
        let vault = vault(objects.clone()).await;
        vault.clients().store(Client::new("c1")).await.unwrap();
        vault.clients().store(Client::new("c2")).await.unwrap();

        let unprovisioned = IdVault::new(
            &StorageConfig::default(),
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryTableStore::new()),
        )
        .unwrap();
        let refresh = CacheRefresh::new(vec![
            unprovisioned.clients().clone() as Arc<dyn SnapshotRefresh>,
            vault.clients().clone() as Arc<dyn SnapshotRefresh>,
        ]);
        let err = refresh.run_once().await.unwrap_err();
        assert!(matches!(err, SchedulerError::CycleFailed { failed: 1, total: 2, .. }));
        assert_eq!(objects.object_count("clientcache"), 1);
    }
}
