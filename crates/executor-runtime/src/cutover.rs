use crate::error::RuntimeError;
use crate::executor::Executor;
use crate::handlers::quoted;
use chrono::Utc;
use ddl_syntax::names::{GcTableState, generate_gc_table_name};
use ddl_syntax::parse::statement_references_table;
use executor_core::collab::{BufferGuard, DbaConn, VReplStream};
use executor_core::error::DbError;
use executor_core::store::ProgressUpdate;
use model::error::ExecutorError;
use model::migration::Migration;
use model::uuid::OnlineDdlUuid;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Message written to the workflow when cut-over stops it.
const CUTOVER_STOP_MESSAGE: &str = "stopped for online DDL cutover";

/// Pause for in-flight queries to settle once buffering starts.
const BUFFERING_SETTLE: Duration = Duration::from_millis(100);

/// Window for the prepared-transaction check under force cut-over.
const PREPARED_TXN_POLL_WINDOW: Duration = Duration::from_millis(100);

/// Poll cadence while waiting for the RENAME to show up blocked.
const RENAME_PROCESS_POLL: Duration = Duration::from_secs(1);

/// Everything the failure path must undo. Fields fill in as the protocol
/// advances; `rollback` releases whatever was acquired, in reverse order.
#[derive(Default)]
struct CutOverState {
    buffer_guard: Option<Box<dyn BufferGuard>>,
    lock_conn: Option<Box<dyn DbaConn>>,
    rename_conn_id: Option<u64>,
    rename_completed: bool,
    restart_workflow: bool,
    kill_loop_cancel: Option<CancellationToken>,
}

impl Executor {
    /// The atomic swap of shadow and live tables. Invoked by the
    /// running-migration reviewer once the workflow is caught up; any error
    /// leaves the migration running and the next tick retries per backoff.
    pub(crate) async fn cut_over_vrepl_migration(
        self: &Arc<Self>,
        migration: &Migration,
        stream: &VReplStream,
        should_force: bool,
    ) -> Result<(), RuntimeError> {
        self.store
            .increment_cutover_attempts(&migration.uuid)
            .await?;
        self.metrics.increment_cutover_attempts();

        if stream.target_table.is_empty() {
            return Err(RuntimeError::Internal(format!(
                "workflow {} reports no shadow table",
                migration.uuid
            )));
        }
        if self.config.test_suite_cutover {
            return self.cut_over_test_suite(migration, stream).await;
        }

        let mut state = CutOverState::default();
        match self
            .cut_over_steps(migration, stream, should_force, &mut state)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(uuid = %migration.uuid, error = %err, "cut-over failed; rolling back");
                self.cut_over_rollback(&migration.uuid, &mut state).await;
                let _ = self
                    .store
                    .update_message(&migration.uuid, &err.to_string())
                    .await;
                Err(err)
            }
        }
    }

    async fn cut_over_steps(
        self: &Arc<Self>,
        migration: &Migration,
        stream: &VReplStream,
        should_force: bool,
        state: &mut CutOverState,
    ) -> Result<(), RuntimeError> {
        let uuid = &migration.uuid;
        let table = migration.mysql_table.clone();
        let shadow = stream.target_table.clone();
        let threshold = migration.cut_over_threshold_or(self.config.cutover_threshold);
        let wide_timeout = threshold * 3;

        self.set_stage(uuid, "starting cut-over").await;

        let sentry = generate_gc_table_name(
            GcTableState::Hold,
            uuid,
            Utc::now() + self.retention_for(migration),
        );
        let mut updated = migration.clone();
        updated.prepend_artifact(&sentry);
        self.store.set_artifacts(uuid, &updated.artifacts).await?;

        let mut prep_conn = self.pool.acquire().await?;
        prep_conn.set_lock_wait_timeout(wide_timeout).await?;

        if migration.strategy.is_analyze_table() && migration.shadow_analyzed_timestamp.is_none() {
            match prep_conn
                .exec(&format!("ANALYZE TABLE {}", quoted(&shadow)))
                .await
            {
                Ok(()) => self.store.set_shadow_analyzed(uuid).await?,
                Err(err) => warn!(uuid = %uuid, error = %err, "ANALYZE TABLE failed"),
            }
        }

        prep_conn
            .exec(&format!(
                "CREATE TABLE {} (id int unsigned PRIMARY KEY)",
                quoted(&sentry)
            ))
            .await?;
        self.set_stage(uuid, "sentry table created").await;

        let post_sentry_pos = self.pool.primary_position().await?;
        self.set_stage(uuid, "waiting for post-sentry pos").await;
        self.vrepl
            .wait_for_pos(stream.id, &post_sentry_pos, wide_timeout)
            .await?;
        self.set_stage(uuid, "post-sentry pos reached").await;

        let mut lock_conn = self.pool.acquire().await?;
        lock_conn.set_lock_wait_timeout(wide_timeout).await?;
        let lock_conn_id = lock_conn.connection_id();

        let mut rename_conn = self.pool.acquire().await?;
        rename_conn.set_lock_wait_timeout(threshold * 2).await?;
        let rename_conn_id = rename_conn.connection_id();
        state.rename_conn_id = Some(rename_conn_id);

        state.buffer_guard = Some(
            self.buffer
                .buffer_writes(&table, threshold + Duration::from_secs(5))
                .await?,
        );
        self.set_stage(uuid, "buffering queries").await;
        sleep(BUFFERING_SETTLE).await;
        self.set_stage(uuid, "graceful wait for buffering").await;

        // From here on a failure must restart the (possibly stopped) stream.
        state.restart_workflow = true;

        let own_connection_ids = [prep_conn.connection_id(), lock_conn_id, rename_conn_id];
        if should_force {
            self.force_clear_blockers(&table, &own_connection_ids).await?;
        }

        self.set_stage(uuid, "locking tables").await;
        lock_conn
            .exec(&format!(
                "LOCK TABLES {} WRITE, {} WRITE",
                quoted(&sentry),
                quoted(&table)
            ))
            .await?;
        state.lock_conn = Some(lock_conn);

        self.set_stage(uuid, "renaming tables").await;
        // Three pairs, six names, one atomic statement. It blocks on the
        // held locks and on the sentry's existence; by the time it executes,
        // the sentry is dropped and the locks are gone.
        let rename_statement = format!(
            "RENAME TABLE {table_q} TO {sentry_q}, {shadow_q} TO {table_q}, {sentry_q} TO {shadow_q}",
            table_q = quoted(&table),
            sentry_q = quoted(&sentry),
            shadow_q = quoted(&shadow),
        );
        let (rename_tx, rename_rx) = oneshot::channel::<Result<(), DbError>>();
        tokio::spawn(async move {
            let mut rename_conn = rename_conn;
            let result = rename_conn.exec(&rename_statement).await;
            let _ = rename_tx.send(result);
        });

        self.set_stage(uuid, "waiting for RENAME to block").await;
        self.wait_for_rename_process(rename_conn_id, wide_timeout)
            .await?;
        self.set_stage(uuid, "RENAME found").await;

        if should_force {
            let cancel = CancellationToken::new();
            state.kill_loop_cancel = Some(cancel.clone());
            self.spawn_lock_holder_killer(
                table.clone(),
                vec![lock_conn_id, rename_conn_id],
                cancel,
            );
        }

        self.set_stage(uuid, "reading post-lock pos").await;
        let post_lock_pos = self.pool.primary_position().await?;
        self.set_stage(uuid, "waiting for post-lock pos").await;
        self.vrepl
            .wait_for_pos(stream.id, &post_lock_pos, threshold)
            .await?;

        self.set_stage(uuid, "stopping vreplication").await;
        self.vrepl
            .stop_workflow(uuid.as_str(), CUTOVER_STOP_MESSAGE)
            .await?;

        self.set_stage(uuid, "dropping sentry table").await;
        let Some(lock_conn) = state.lock_conn.as_mut() else {
            return Err(RuntimeError::Internal("lock connection not held".to_string()));
        };
        lock_conn
            .exec(&format!("DROP TABLE IF EXISTS {}", quoted(&sentry)))
            .await?;

        self.set_stage(uuid, "unlocking tables").await;
        lock_conn.exec("UNLOCK TABLES").await?;

        self.set_stage(uuid, "waiting for RENAME to complete").await;
        let rename_result = timeout(wide_timeout, rename_rx)
            .await
            .map_err(|_| DbError::Timeout("RENAME did not complete".to_string()))?
            .map_err(|_| DbError::Other("rename task dropped its result".to_string()))?;
        rename_result?;
        state.rename_completed = true;

        if let Some(cancel) = state.kill_loop_cancel.take() {
            cancel.cancel();
        }

        self.set_stage(uuid, "cut-over complete").await;
        self.set_stage(uuid, "re-enabling writes").await;
        if let Some(mut buffer_guard) = state.buffer_guard.take() {
            buffer_guard.release().await;
        }

        self.store
            .update_progress(
                uuid,
                &ProgressUpdate {
                    rows_copied: stream.rows_copied,
                    table_rows: migration.table_rows,
                    progress: 100.0,
                    eta_seconds: 0,
                    vreplication_lag_seconds: 0.0,
                    vitess_liveness_indicator: stream.time_updated,
                },
            )
            .await?;
        info!(uuid = %uuid, table = %table, "cut-over complete");
        self.finalize_complete(uuid).await;
        Ok(())
    }

    /// Test-suite path: no sentry, no locks; the two-pair RENAME is atomic
    /// and the brief table-absent window is acceptable in tests.
    async fn cut_over_test_suite(
        self: &Arc<Self>,
        migration: &Migration,
        stream: &VReplStream,
    ) -> Result<(), RuntimeError> {
        let uuid = &migration.uuid;
        self.set_stage(uuid, "starting cut-over").await;
        self.vrepl
            .stop_workflow(uuid.as_str(), CUTOVER_STOP_MESSAGE)
            .await?;
        let before = format!("{}_before", migration.mysql_table);
        let mut updated = migration.clone();
        updated.prepend_artifact(&before);
        self.store.set_artifacts(uuid, &updated.artifacts).await?;
        self.pool
            .exec(&format!(
                "RENAME TABLE {table} TO {before_q}, {shadow} TO {table}",
                table = quoted(&migration.mysql_table),
                before_q = quoted(&before),
                shadow = quoted(&stream.target_table),
            ))
            .await?;
        self.set_stage(uuid, "cut-over complete").await;
        self.finalize_complete(uuid).await;
        Ok(())
    }

    /// Under force cut-over: verify no prepared transactions touch the
    /// table, then KILL queries that reference it and connections holding
    /// locks on it.
    async fn force_clear_blockers(
        &self,
        table: &str,
        own_connection_ids: &[u64],
    ) -> Result<(), RuntimeError> {
        let deadline = Instant::now() + PREPARED_TXN_POLL_WINDOW;
        loop {
            let prepared = self.buffer.prepared_transactions_for(table).await?;
            if prepared.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(ExecutorError::failed_precondition(format!(
                    "cannot force cut-over: prepared transactions reference table {table}"
                ))
                .into());
            }
            sleep(Duration::from_millis(10)).await;
        }

        for process in self.pool.process_list().await? {
            if own_connection_ids.contains(&process.id) {
                continue;
            }
            let Some(process_info) = &process.info else {
                continue;
            };
            // Parse the query; only statements that truly reference the
            // table get killed.
            if statement_references_table(process_info, table) {
                match self.pool.kill_query(process.id).await {
                    Ok(()) => {
                        info!(connection_id = process.id, table = %table, "killed query for cut-over")
                    }
                    Err(err) => warn!(connection_id = process.id, error = %err, "KILL QUERY failed"),
                }
            }
        }

        for holder in self.pool.lock_holders(table).await? {
            if own_connection_ids.contains(&holder) {
                continue;
            }
            match self.pool.kill_connection(holder).await {
                Ok(()) => {
                    info!(connection_id = holder, table = %table, "killed lock holder for cut-over")
                }
                Err(err) => warn!(connection_id = holder, error = %err, "KILL failed"),
            }
        }
        Ok(())
    }

    /// Confirms the RENAME is in flight (blocked on our locks) by finding it
    /// in the process list.
    async fn wait_for_rename_process(
        &self,
        rename_conn_id: u64,
        wait_timeout: Duration,
    ) -> Result<(), RuntimeError> {
        let deadline = Instant::now() + wait_timeout;
        loop {
            let found = self.pool.process_list().await?.into_iter().any(|process| {
                process.id == rename_conn_id
                    && process
                        .info
                        .as_deref()
                        .map(|info| info.to_ascii_uppercase().contains("RENAME TABLE"))
                        .unwrap_or(false)
            });
            if found {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DbError::Timeout(
                    "RENAME process did not appear in the process list".to_string(),
                )
                .into());
            }
            sleep(RENAME_PROCESS_POLL).await;
        }
    }

    /// While a forced RENAME is blocked, keep clearing new lock holders.
    fn spawn_lock_holder_killer(
        self: &Arc<Self>,
        table: String,
        exclude: Vec<u64>,
        cancel: CancellationToken,
    ) {
        let executor = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(Duration::from_millis(100)) => {
                        let Ok(holders) = executor.pool.lock_holders(&table).await else {
                            continue;
                        };
                        for holder in holders {
                            if !exclude.contains(&holder) {
                                let _ = executor.pool.kill_connection(holder).await;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Releases, in reverse order, whatever a failed cut-over still holds.
    async fn cut_over_rollback(&self, uuid: &OnlineDdlUuid, state: &mut CutOverState) {
        if let Some(cancel) = state.kill_loop_cancel.take() {
            cancel.cancel();
        }
        if !state.rename_completed {
            if let Some(rename_conn_id) = state.rename_conn_id {
                if let Err(err) = self.pool.kill_connection(rename_conn_id).await {
                    debug!(uuid = %uuid, error = %err, "kill of rename connection failed");
                }
            }
        }
        if let Some(mut lock_conn) = state.lock_conn.take() {
            let _ = lock_conn.exec("UNLOCK TABLES").await;
        }
        if let Some(mut buffer_guard) = state.buffer_guard.take() {
            buffer_guard.release().await;
        }
        if state.restart_workflow {
            if let Err(err) = self.vrepl.start_workflow(uuid.as_str()).await {
                warn!(uuid = %uuid, error = %err, "cannot restart vreplication after failed cut-over");
            }
        }
    }

    pub(crate) async fn set_stage(&self, uuid: &OnlineDdlUuid, stage: &str) {
        debug!(uuid = %uuid, stage, "cut-over stage");
        if let Err(err) = self.store.update_stage(uuid, stage).await {
            warn!(uuid = %uuid, error = %err, "cannot persist migration stage");
        }
    }
}
