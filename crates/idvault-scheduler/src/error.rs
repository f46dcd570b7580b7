use idvault_repo::{ConfigError, RepoError};
use thiserror::Error;

/// Errors from loop lifecycle calls and units of work.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `start` was called on a running loop.
    #[error("{0} loop is already running")]
    AlreadyRunning(&'static str),

    /// `stop` was called on a stopped loop.
    #[error("{0} loop is not running")]
    NotRunning(&'static str),

    #[error("{work}: {failed} of {total} targets failed")]
    CycleFailed {
        work: &'static str,
        failed: usize,
        total: usize,
    },

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
