use crate::error::RuntimeError;
use chrono::Duration as ChronoDuration;
use executor_core::collab::{ConnectionPool, QueryBuffer, TabletManager, Throttler, VReplClient};
use executor_core::config::{ExecutorConfig, MAX_MESSAGE_LENGTH};
use executor_core::lasterror::LastError;
use executor_core::metrics::Metrics;
use executor_core::ownership::OwnershipSet;
use executor_core::store::MetadataStore;
use model::error::ExecutorError;
use model::migration::Migration;
use model::status::{MigrationStatus, TabletType};
use model::uuid::OnlineDdlUuid;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The per-primary online DDL executor. One long-lived instance per tablet;
/// all cross-task state lives either in the metadata store or behind the
/// coarse migration mutex, with a handful of atomic flags.
pub struct Executor {
    pub(crate) config: ExecutorConfig,
    pub(crate) store: Arc<dyn MetadataStore>,
    pub(crate) pool: Arc<dyn ConnectionPool>,
    pub(crate) vrepl: Arc<dyn VReplClient>,
    pub(crate) tablets: Arc<dyn TabletManager>,
    pub(crate) throttler: Arc<dyn Throttler>,
    pub(crate) buffer: Arc<dyn QueryBuffer>,
    pub(crate) metrics: Metrics,
    pub(crate) owned: OwnershipSet,

    /// Serializes every mutating pass except the long-running cut-over body.
    pub(crate) migration_mutex: Mutex<()>,
    /// Serializes submissions so singleton checks cannot race.
    pub(crate) submit_mutex: Mutex<()>,
    /// Per-stream error windows, keyed by migration uuid.
    pub(crate) vrepl_last_error: Mutex<HashMap<OnlineDdlUuid, LastError>>,

    pub(crate) is_open: AtomicBool,
    pub(crate) is_primary: AtomicBool,
    pub(crate) instant_ddl_capable: AtomicBool,
    pub(crate) tick_in_progress: AtomicBool,
    pub(crate) fix_completed_done: AtomicBool,

    pub(crate) trigger_tx: mpsc::UnboundedSender<()>,
    trigger_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    pub(crate) cancel: CancellationToken,
}

impl Executor {
    pub fn new(
        config: ExecutorConfig,
        store: Arc<dyn MetadataStore>,
        pool: Arc<dyn ConnectionPool>,
        vrepl: Arc<dyn VReplClient>,
        tablets: Arc<dyn TabletManager>,
        throttler: Arc<dyn Throttler>,
        buffer: Arc<dyn QueryBuffer>,
    ) -> Arc<Self> {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        Arc::new(Executor {
            config,
            store,
            pool,
            vrepl,
            tablets,
            throttler,
            buffer,
            metrics: Metrics::new(),
            owned: OwnershipSet::new(),
            migration_mutex: Mutex::new(()),
            submit_mutex: Mutex::new(()),
            vrepl_last_error: Mutex::new(HashMap::new()),
            is_open: AtomicBool::new(false),
            is_primary: AtomicBool::new(false),
            instant_ddl_capable: AtomicBool::new(false),
            tick_in_progress: AtomicBool::new(false),
            fix_completed_done: AtomicBool::new(false),
            trigger_tx,
            trigger_rx: std::sync::Mutex::new(Some(trigger_rx)),
            cancel: CancellationToken::new(),
        })
    }

    /// Brings the executor up: bootstraps the metadata schema, probes server
    /// capabilities and starts the tick loop.
    pub async fn open(self: &Arc<Self>, tablet_type: TabletType) -> Result<(), RuntimeError> {
        if self.is_open.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.is_primary
            .store(tablet_type.is_primary(), Ordering::SeqCst);
        self.store.init_schema().await?;
        self.probe_capabilities().await;
        self.owned.clear();

        self.is_open.store(true, Ordering::SeqCst);
        if let Some(trigger_rx) = self.trigger_rx.lock().expect("trigger receiver").take() {
            let executor = self.clone();
            tokio::spawn(async move {
                executor.run_tick_loop(trigger_rx).await;
            });
        }
        info!(
            keyspace = %self.config.keyspace,
            shard = %self.config.shard,
            "online DDL executor is open"
        );
        Ok(())
    }

    /// Stops the tick loop and forgets in-memory ownership. Durable state
    /// stays in the metadata store for the next open.
    pub fn close(&self) {
        if !self.is_open.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.owned.clear();
        info!("online DDL executor is closed");
    }

    /// The tablet changed roles; only a primary runs migrations.
    pub fn set_tablet_type(&self, tablet_type: TabletType) {
        self.is_primary
            .store(tablet_type.is_primary(), Ordering::SeqCst);
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn owned_migration_uuids(&self) -> Vec<OnlineDdlUuid> {
        self.owned.uuids()
    }

    /// Requests an early tick; the loop re-arms at 1s/5s/10s/20s.
    pub fn trigger_next_check(&self) {
        let _ = self.trigger_tx.send(());
    }

    pub(crate) fn is_primary_tablet(&self) -> bool {
        self.is_primary.load(Ordering::SeqCst)
    }

    /// Gate for every mutating API call.
    pub(crate) fn check_open(&self) -> Result<(), ExecutorError> {
        if !self.config.enabled {
            return Err(ExecutorError::OnlineDdlDisabled);
        }
        if !self.is_open.load(Ordering::SeqCst) {
            return Err(ExecutorError::unavailable("online DDL executor is closed"));
        }
        Ok(())
    }

    pub(crate) async fn read_migration_required(
        &self,
        uuid: &OnlineDdlUuid,
    ) -> Result<Migration, RuntimeError> {
        self.store
            .read_migration(uuid)
            .await?
            .ok_or_else(|| ExecutorError::MigrationNotFound(uuid.to_string()).into())
    }

    /// Detects whether the server can run INSTANT DDL (MySQL 8.0+).
    async fn probe_capabilities(&self) {
        match self.pool.global_variable("version").await {
            Ok(Some(version)) => {
                let major: u32 = version
                    .split('.')
                    .next()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                self.instant_ddl_capable.store(major >= 8, Ordering::SeqCst);
            }
            Ok(None) => {
                self.instant_ddl_capable.store(false, Ordering::SeqCst);
            }
            Err(err) => {
                warn!(error = %err, "cannot probe server version");
                self.instant_ddl_capable.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Every handler funnels non-acceptable errors through here: the row
    /// turns failed (or cancelled, when a user cancel is in flight), the
    /// message is persisted, ownership is dropped and the next tick fires.
    pub(crate) async fn fail_migration(&self, uuid: &OnlineDdlUuid, message: &str) {
        let status = match self.store.read_migration(uuid).await {
            Ok(Some(migration)) if migration.cancelled_timestamp.is_some() => {
                MigrationStatus::Cancelled
            }
            _ => MigrationStatus::Failed,
        };
        let message = truncate_message(message);
        if let Err(err) = self.store.mark_terminal(uuid, status, &message).await {
            error!(uuid = %uuid, error = %err, "cannot mark migration terminal");
        }
        match status {
            MigrationStatus::Cancelled => self.metrics.increment_cancelled(),
            _ => self.metrics.increment_failed(),
        }
        self.owned.remove(uuid);
        self.vrepl_last_error.lock().await.remove(uuid);
        warn!(uuid = %uuid, message = %message, status = %status, "migration failed");
        self.trigger_next_check();
    }

    /// Transitions a picked migration into `running` under this tablet.
    pub(crate) async fn mark_migration_running(
        &self,
        uuid: &OnlineDdlUuid,
    ) -> Result<(), RuntimeError> {
        self.store
            .mark_running(uuid, &self.config.tablet_alias)
            .await?;
        self.owned.add(uuid);
        Ok(())
    }

    /// Terminal success: stamps the row, releases ownership, reloads schema.
    pub(crate) async fn finalize_complete(self: &Arc<Self>, uuid: &OnlineDdlUuid) {
        if let Err(err) = self
            .store
            .mark_terminal(uuid, MigrationStatus::Complete, "")
            .await
        {
            error!(uuid = %uuid, error = %err, "cannot mark migration complete");
            return;
        }
        self.owned.remove(uuid);
        self.vrepl_last_error.lock().await.remove(uuid);
        self.metrics.increment_completed();
        let executor = self.clone();
        tokio::spawn(async move {
            if let Err(err) = executor.tablets.reload_schema().await {
                warn!(error = %err, "schema reload failed");
            }
            if let Err(err) = executor.tablets.refresh_state().await {
                warn!(error = %err, "query routing refresh failed");
            }
        });
        info!(uuid = %uuid, "migration complete");
        self.trigger_next_check();
    }

    /// Best-effort teardown of the migration's replication workflow.
    pub(crate) async fn terminate_vrepl_migration(&self, uuid: &OnlineDdlUuid) {
        if let Err(err) = self
            .vrepl
            .stop_workflow(uuid.as_str(), "migration terminated")
            .await
        {
            warn!(uuid = %uuid, error = %err, "cannot stop vreplication workflow");
        }
        if let Err(err) = self.vrepl.delete_workflow(uuid.as_str()).await {
            warn!(uuid = %uuid, error = %err, "cannot delete vreplication workflow");
        }
    }

    /// Artifact retention for a migration: the per-row override, or the
    /// configured default.
    pub(crate) fn retention_for(&self, migration: &Migration) -> ChronoDuration {
        if migration.retain_artifacts_seconds > 0 {
            ChronoDuration::seconds(migration.retain_artifacts_seconds)
        } else {
            ChronoDuration::seconds(self.config.retain_artifacts.as_secs() as i64)
        }
    }

}

/// Truncates to the message column's capacity on a char boundary.
pub(crate) fn truncate_message(message: &str) -> String {
    if message.len() <= MAX_MESSAGE_LENGTH {
        return message.to_string();
    }
    let mut end = MAX_MESSAGE_LENGTH;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_truncation_respects_char_boundaries() {
        let short = "all good";
        assert_eq!(truncate_message(short), short);

        let long = "x".repeat(MAX_MESSAGE_LENGTH + 100);
        assert_eq!(truncate_message(&long).len(), MAX_MESSAGE_LENGTH);

        // Multi-byte character straddling the cut point.
        let mut tricky = "y".repeat(MAX_MESSAGE_LENGTH - 1);
        tricky.push('é');
        tricky.push_str("tail");
        let truncated = truncate_message(&tricky);
        assert!(truncated.len() <= MAX_MESSAGE_LENGTH);
        assert!(truncated.is_char_boundary(truncated.len()));
    }
}
