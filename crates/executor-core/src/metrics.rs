use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    running_migrations: AtomicU64,
    /// Gauge: the most-stale running migration, in minutes.
    max_stale_minutes: AtomicU64,
    cutover_attempts: AtomicU64,
    completed_migrations: AtomicU64,
    failed_migrations: AtomicU64,
    cancelled_migrations: AtomicU64,
}

/// Cheap, clonable executor metrics; readers take a consistent-enough
/// snapshot of relaxed atomics.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub running_migrations: u64,
    pub max_stale_minutes: u64,
    pub cutover_attempts: u64,
    pub completed_migrations: u64,
    pub failed_migrations: u64,
    pub cancelled_migrations: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::default()
    }

    pub fn set_running_migrations(&self, count: u64) {
        self.inner.running_migrations.store(count, Ordering::Relaxed);
    }

    pub fn set_max_stale_minutes(&self, minutes: u64) {
        self.inner.max_stale_minutes.store(minutes, Ordering::Relaxed);
    }

    pub fn increment_cutover_attempts(&self) {
        self.inner.cutover_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_completed(&self) {
        self.inner
            .completed_migrations
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.inner.failed_migrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cancelled(&self) {
        self.inner
            .cancelled_migrations
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            running_migrations: self.inner.running_migrations.load(Ordering::Relaxed),
            max_stale_minutes: self.inner.max_stale_minutes.load(Ordering::Relaxed),
            cutover_attempts: self.inner.cutover_attempts.load(Ordering::Relaxed),
            completed_migrations: self.inner.completed_migrations.load(Ordering::Relaxed),
            failed_migrations: self.inner.failed_migrations.load(Ordering::Relaxed),
            cancelled_migrations: self.inner.cancelled_migrations.load(Ordering::Relaxed),
        }
    }
}
