//! Start/stop state machine around one periodic unit of work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{SchedulerError, SchedulerResult};

/// One cycle of background work.
#[async_trait]
pub trait UnitOfWork: Send + Sync + 'static {
    /// Loop name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Run one cycle. Errors are logged by the loop, which keeps running.
    async fn run_once(&self) -> SchedulerResult<()>;
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Counters {
    cycles: AtomicU64,
    failures: AtomicU64,
}

/// A loop that sleeps for `interval`, runs its unit of work, and repeats
/// until stopped.
///
/// Stopped -> `start` -> Running -> `stop` -> Stopped. Starting a running
/// loop or stopping a stopped one is an error. Cancellation interrupts both
/// the sleep and an in-flight unit of work.
pub struct BackgroundLoop<W> {
    work: Arc<W>,
    interval: Duration,
    running: Mutex<Option<Running>>,
    counters: Arc<Counters>,
}

impl<W: UnitOfWork> BackgroundLoop<W> {
    pub fn new(work: W, interval: Duration) -> Self {
        Self {
            work: Arc::new(work),
            interval,
            running: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn work(&self) -> &W {
        &self.work
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the loop. It also stops when `parent` is cancelled.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self, parent: &CancellationToken) -> SchedulerResult<()> {
        let mut running = self.running.lock().expect("lock poisoned");
        if running.is_some() {
            return Err(SchedulerError::AlreadyRunning(self.work.name()));
        }
        let token = parent.child_token();
        let handle = tokio::spawn(run_loop(
            self.work.clone(),
            self.interval,
            token.clone(),
            self.counters.clone(),
        ));
        *running = Some(Running { token, handle });
        info!(work = self.work.name(), interval_secs = self.interval.as_secs(), "background loop started");
        Ok(())
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(&self) -> SchedulerResult<()> {
        let running = self
            .running
            .lock()
            .expect("lock poisoned")
            .take()
            .ok_or(SchedulerError::NotRunning(self.work.name()))?;
        running.token.cancel();
        if let Err(err) = running.handle.await {
            warn!(work = self.work.name(), error = %err, "background loop task failed");
        }
        info!(work = self.work.name(), cycles = self.cycles(), "background loop stopped");
        Ok(())
    }

    /// Whether the loop was started, not stopped, and has not exited.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Completed units of work, failed ones included.
    pub fn cycles(&self) -> u64 {
        self.counters.cycles.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.counters.failures.load(Ordering::Relaxed)
    }
}

async fn run_loop<W: UnitOfWork>(
    work: Arc<W>,
    interval: Duration,
    token: CancellationToken,
    counters: Arc<Counters>,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            outcome = work.run_once() => outcome,
        };
        counters.cycles.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Ok(()) => debug!(work = work.name(), "cycle complete"),
            Err(err) => {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(work = work.name(), error = %err, "cycle failed, retrying next interval");
            }
        }
    }
    debug!(work = work.name(), "background loop exiting");
}

impl<W> Drop for BackgroundLoop<W> {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            if let Some(running) = running.take() {
                running.token.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::time::Instant;

    #[derive(Default)]
    struct Probe {
        runs: AtomicU64,
        fail: AtomicBool,
    }

    #[async_trait]
    impl UnitOfWork for Arc<Probe> {
        fn name(&self) -> &'static str {
            "probe"
        }

        async fn run_once(&self) -> SchedulerResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(SchedulerError::CycleFailed {
                    work: "probe",
                    failed: 1,
                    total: 1,
                });
            }
            Ok(())
        }
    }

    fn probe_loop(interval_secs: u64) -> (Arc<Probe>, BackgroundLoop<Arc<Probe>>) {
        let probe = Arc::new(Probe::default());
        let lp = BackgroundLoop::new(probe.clone(), Duration::from_secs(interval_secs));
        (probe, lp)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_once_per_interval() {
        let (probe, lp) = probe_loop(10);
        lp.start(&CancellationToken::new()).unwrap();
        assert!(lp.is_running());

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(probe.runs.load(Ordering::SeqCst), 3);
        assert_eq!(lp.cycles(), 3);

        lp.stop().await.unwrap();
        assert!(!lp.is_running());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(probe.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn no_work_before_first_interval() {
        let (probe, lp) = probe_loop(10);
        lp.start(&CancellationToken::new()).unwrap();
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(probe.runs.load(Ordering::SeqCst), 0);
        lp.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_the_sleep() {
        let (probe, lp) = probe_loop(3600);
        lp.start(&CancellationToken::new()).unwrap();
        tokio::task::yield_now().await;

        let before = Instant::now();
        lp.stop().await.unwrap();
        assert!(before.elapsed() < Duration::from_secs(1));
        assert_eq!(probe.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_and_double_stop_are_errors() {
        let (_, lp) = probe_loop(10);
        assert!(matches!(lp.stop().await, Err(SchedulerError::NotRunning("probe"))));

        let token = CancellationToken::new();
        lp.start(&token).unwrap();
        assert!(matches!(lp.start(&token), Err(SchedulerError::AlreadyRunning("probe"))));
        lp.stop().await.unwrap();
        assert!(matches!(lp.stop().await, Err(SchedulerError::NotRunning(_))));

        // Restartable after a stop.
        lp.start(&token).unwrap();
        lp.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_end_the_loop() {
        let (probe, lp) = probe_loop(10);
        probe.fail.store(true, Ordering::SeqCst);
        lp.start(&CancellationToken::new()).unwrap();

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(lp.cycles(), 2);
        assert_eq!(lp.failures(), 2);
        assert!(lp.is_running());

        probe.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(lp.cycles(), 3);
        assert_eq!(lp.failures(), 2);
        lp.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_ends_the_loop() {
        let (probe, lp) = probe_loop(10);
        let parent = CancellationToken::new();
        lp.start(&parent).unwrap();
        parent.cancel();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(!lp.is_running());
        assert_eq!(probe.runs.load(Ordering::SeqCst), 0);
        // Exited, but only stop clears the state.
        lp.stop().await.unwrap();
    }
}
