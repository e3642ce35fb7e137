use crate::executor::Executor;
use executor_core::backoff::TICK_REARM_INTERVALS;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval, sleep, sleep_until};
use tracing::warn;

/// Breather between consecutive ticks.
const TICK_COOLDOWN: Duration = Duration::from_secs(1);

impl Executor {
    /// The single periodic driver. Fires on the configured interval; an
    /// explicit trigger re-arms additional ticks at 1s/5s/10s/20s, pulling
    /// the next check forward but never pushing it back.
    pub(crate) async fn run_tick_loop(
        self: Arc<Self>,
        mut trigger_rx: mpsc::UnboundedReceiver<()>,
    ) {
        let mut periodic = interval(self.config.check_interval);
        let mut rearmed: BinaryHeap<Reverse<Instant>> = BinaryHeap::new();
        loop {
            let next_rearmed = rearmed.peek().map(|Reverse(deadline)| *deadline);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = periodic.tick() => {
                    self.run_tick().await;
                    sleep(TICK_COOLDOWN).await;
                }
                received = trigger_rx.recv() => {
                    match received {
                        Some(()) => {
                            let now = Instant::now();
                            for offset in TICK_REARM_INTERVALS {
                                rearmed.push(Reverse(now + offset));
                            }
                        }
                        None => break,
                    }
                }
                _ = deadline_sleep(next_rearmed) => {
                    rearmed.pop();
                    self.run_tick().await;
                    sleep(TICK_COOLDOWN).await;
                }
            }
        }
    }

    /// One pass over all executor duties, in dependency order. Non-reentrant
    /// via a CAS flag; each step is best-effort and logged on error.
    pub async fn run_tick(self: &Arc<Self>) {
        if !self.is_open.load(Ordering::SeqCst)
            || !self.is_primary_tablet()
            || self.config.keyspace.is_empty()
        {
            return;
        }
        if self
            .tick_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        if let Err(err) = self.retry_tablet_failure_migrations().await {
            warn!(error = %err, "tablet-failure retry pass failed");
        }
        if let Err(err) = self.review_queued_migrations().await {
            warn!(error = %err, "review pass failed");
        }
        if let Err(err) = self.schedule_next_migration().await {
            warn!(error = %err, "scheduler pass failed");
        }
        if let Err(err) = self.run_next_migration().await {
            warn!(error = %err, "runner pass failed");
        }
        match self.review_running_migrations().await {
            Ok(cancellations) => {
                for request in cancellations {
                    if let Err(err) = self
                        .cancel_migration(&request.uuid, &request.message, false)
                        .await
                    {
                        warn!(uuid = %request.uuid, error = %err, "batch cancel failed");
                    }
                }
            }
            Err(err) => warn!(error = %err, "running-migration review pass failed"),
        }
        if let Err(err) = self.warn_stale_migrations().await {
            warn!(error = %err, "stale-warning pass failed");
        }
        if let Err(err) = self.fail_stale_migrations().await {
            warn!(error = %err, "stale-failing pass failed");
        }
        if let Err(err) = self.gc_artifacts().await {
            warn!(error = %err, "artifact GC pass failed");
        }

        self.tick_in_progress.store(false, Ordering::SeqCst);
    }
}

/// Sleeps until the deadline; pends forever when there is none, so the
/// select branch simply never fires.
async fn deadline_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
