use std::sync::Arc;

use async_trait::async_trait;
use idvault_repo::PersistedGrantStore;
use tracing::{debug, info, warn};

use crate::background::{BackgroundLoop, UnitOfWork};
use crate::error::SchedulerResult;

/// Totals of one cleanup pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub batches: usize,
    pub removed: usize,
    /// Already gone when we tried to delete them.
    pub missing: usize,
    pub failed: usize,
}

/// Deletes expired persisted grants in batches.
pub struct GrantCleanup {
    grants: Arc<PersistedGrantStore>,
    batch_size: usize,
}

impl GrantCleanup {
    pub fn new(grants: Arc<PersistedGrantStore>, batch_size: usize) -> Self {
        Self {
            grants,
            batch_size: batch_size.max(1),
        }
    }

    /// Drain the expired set.
    ///
    /// Fetches up to `batch_size` expired grants and deletes each by key,
    /// until a batch comes back short. A pass also ends when a full batch
    /// yields no progress, so undeletable grants cannot spin it.
    pub async fn purge(&self) -> SchedulerResult<CleanupReport> {
        let mut report = CleanupReport::default();
        loop {
            let batch = self.grants.get_expired(self.batch_size).await?;
            report.batches += 1;
            let fetched = batch.len();
            let mut progress = 0;
            for grant in batch {
                match self.grants.remove_by_key(&grant.key).await {
                    Ok(true) => {
                        report.removed += 1;
                        progress += 1;
                    }
                    Ok(false) => {
                        debug!(key = %grant.key, "expired grant already removed");
                        report.missing += 1;
                        progress += 1;
                    }
                    Err(err) => {
                        warn!(key = %grant.key, error = %err, "failed to remove expired grant");
                        report.failed += 1;
                    }
                }
            }
            if fetched < self.batch_size {
                break;
            }
            if progress == 0 {
                warn!(batch = fetched, "no expired grant in batch could be removed, ending pass");
                break;
            }
        }
        Ok(report)
    }
}

#[async_trait]
impl UnitOfWork for GrantCleanup {
    fn name(&self) -> &'static str {
        "grant-cleanup"
    }

    async fn run_once(&self) -> SchedulerResult<()> {
        let report = self.purge().await?;
        info!(
            batches = report.batches,
            removed = report.removed,
            missing = report.missing,
            failed = report.failed,
            "grant cleanup cycle complete"
        );
        Ok(())
    }
}

pub type CleanupLoop = BackgroundLoop<GrantCleanup>;
