use idvault_repo::IdVault;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cleanup::{CleanupLoop, GrantCleanup};
use crate::config::{CleanupSettings, RefreshSettings};
use crate::error::SchedulerResult;
use crate::refresh::{CacheRefresh, CacheRefreshLoop};

/// The enabled background loops of one vault.
pub struct BackgroundServices {
    refresh: Option<CacheRefreshLoop>,
    cleanup: Option<CleanupLoop>,
}

impl BackgroundServices {
    /// Validate settings and build a loop for each enabled one.
    pub fn new(vault: &IdVault, refresh: &RefreshSettings, cleanup: &CleanupSettings) -> SchedulerResult<Self> {
        refresh.validate()?;
        cleanup.validate()?;
        let refresh = refresh
            .enabled
            .then(|| CacheRefreshLoop::new(CacheRefresh::new(vault.refresh_targets()), refresh.interval()));
        let cleanup = cleanup.enabled.then(|| {
            CleanupLoop::new(
                GrantCleanup::new(vault.grants().clone(), cleanup.batch_size),
                cleanup.interval(),
            )
        });
        Ok(Self { refresh, cleanup })
    }

    pub fn refresh(&self) -> Option<&CacheRefreshLoop> {
        self.refresh.as_ref()
    }

    pub fn cleanup(&self) -> Option<&CleanupLoop> {
        self.cleanup.as_ref()
    }

    pub fn start(&self, shutdown: &CancellationToken) -> SchedulerResult<()> {
        if let Some(refresh) = &self.refresh {
            refresh.start(shutdown)?;
        }
        if let Some(cleanup) = &self.cleanup {
            cleanup.start(shutdown)?;
        }
        info!(
            refresh = self.refresh.is_some(),
            cleanup = self.cleanup.is_some(),
            "background services started"
        );
        Ok(())
    }

    pub async fn stop(&self) -> SchedulerResult<()> {
        if let Some(refresh) = &self.refresh {
            refresh.stop().await?;
        }
        if let Some(cleanup) = &self.cleanup {
            cleanup.stop().await?;
        }
        Ok(())
    }
}
