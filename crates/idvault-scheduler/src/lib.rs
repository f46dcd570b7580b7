//! Background loops for idvault.
//!
//! Two loop kinds share one state machine ([`BackgroundLoop`]):
//!
//! - [`CacheRefreshLoop`] rebuilds every snapshot from a full listing and
//!   prunes stale snapshots;
//! - [`CleanupLoop`] drains expired persisted grants in batches.
//!
//! A loop sleeps for its interval, runs one unit of work, logs any failure
//! and repeats. Stopping cancels the sleep or the in-flight work at once.

pub mod background;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod refresh;
pub mod services;

pub use background::{BackgroundLoop, UnitOfWork};
pub use cleanup::{CleanupLoop, CleanupReport, GrantCleanup};
pub use config::{CleanupSettings, RefreshSettings};
pub use error::{SchedulerError, SchedulerResult};
pub use refresh::{CacheRefresh, CacheRefreshLoop};
pub use services::BackgroundServices;
