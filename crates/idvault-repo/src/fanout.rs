//! Concurrent sub-operations joined into one result.

use futures::future::{join_all, BoxFuture};
use idvault_store::{StoreError, StoreResult};
use tracing::warn;

use crate::error::{RepoError, RepoResult};

pub(crate) type SubOp<'a> = BoxFuture<'a, StoreResult<()>>;

/// Run every sub-operation to completion, then report.
///
/// A failure never cancels its siblings; every failure is logged and
/// collected into [`RepoError::Partial`].
pub(crate) async fn join_reporting(operation: &'static str, ops: Vec<SubOp<'_>>) -> RepoResult<()> {
    let total = ops.len();
    let failures: Vec<StoreError> = join_all(ops)
        .await
        .into_iter()
        .filter_map(Result::err)
        .collect();
    if failures.is_empty() {
        return Ok(());
    }
    for err in &failures {
        warn!(operation, error = %err, "sub-operation failed");
    }
    Err(RepoError::Partial {
        operation,
        total,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn failures_do_not_cancel_siblings() {
        let completed = AtomicUsize::new(0);
        let ops: Vec<SubOp<'_>> = (0..4)
            .map(|i| {
                let completed = &completed;
                async move {
                    completed.fetch_add(1, Ordering::SeqCst);
                    if i % 2 == 0 {
                        Err(StoreError::backend("put", format!("obj{i}"), "boom"))
                    } else {
                        Ok(())
                    }
                }
                .boxed()
            })
            .collect();

        let err = join_reporting("test", ops).await.unwrap_err();
        assert_eq!(completed.load(Ordering::SeqCst), 4);
        match err {
            RepoError::Partial { total, failures, .. } => {
                assert_eq!(total, 4);
                assert_eq!(failures.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_is_ok() {
        assert!(join_reporting("noop", Vec::new()).await.is_ok());
    }
}
