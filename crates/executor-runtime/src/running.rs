use crate::error::RuntimeError;
use crate::executor::Executor;
use chrono::{DateTime, Utc};
use executor_core::backoff::evaluate_cutover_attempt;
use executor_core::collab::VReplStream;
use executor_core::config::THROTTLER_APP;
use executor_core::lasterror::LastError;
use executor_core::store::ProgressUpdate;
use model::migration::Migration;
use model::status::MigrationStatus;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// A cancellation decided during the running review; executed as a batch
/// after the loop so the review pass itself stays read-mostly.
pub(crate) struct CancellationRequest {
    pub uuid: model::uuid::OnlineDdlUuid,
    pub message: String,
}

impl Executor {
    /// Walks every `running` migration: refreshes progress and liveness,
    /// adopts orphans, detects terminal replication errors, and fires
    /// cut-over when a workflow is ready.
    pub(crate) async fn review_running_migrations(
        self: &Arc<Self>,
    ) -> Result<Vec<CancellationRequest>, RuntimeError> {
        let now = Utc::now();
        let running = self.store.migrations_by_status(MigrationStatus::Running).await?;
        let pending = self.store.pending_migrations().await?;
        self.metrics.set_running_migrations(running.len() as u64);

        let mut cancellations = Vec::new();
        for migration in &running {
            if let Err(err) = self
                .review_one_running_migration(migration, &pending, now, &mut cancellations)
                .await
            {
                warn!(uuid = %migration.uuid, error = %err, "running-migration review failed");
            }
        }

        // Ownership reconciliation: anything neither running nor pending is
        // nobody's to drive.
        let keep: HashSet<_> = running
            .iter()
            .chain(pending.iter())
            .map(|m| m.uuid.clone())
            .collect();
        self.owned.prune_except(&keep);

        Ok(cancellations)
    }

    async fn review_one_running_migration(
        self: &Arc<Self>,
        migration: &Migration,
        pending: &[Migration],
        now: DateTime<Utc>,
        cancellations: &mut Vec<CancellationRequest>,
    ) -> Result<(), RuntimeError> {
        // Effective throttle = max(global online-DDL throttle, per-migration).
        let global_ratio = self.throttler.ratio_for(THROTTLER_APP).await;
        let own_ratio = self.throttler.ratio_for(migration.uuid.as_str()).await;
        let effective_ratio = global_ratio.max(own_ratio);
        if (effective_ratio - migration.user_throttle_ratio).abs() > f64::EPSILON {
            self.store
                .set_user_throttle_ratio(&migration.uuid, effective_ratio)
                .await?;
        }

        if !migration.runs_vreplication() {
            // Direct/mysql ALTERs are driven by their own task; this pass
            // only attests liveness for the rows it owns.
            if self.owned.contains(&migration.uuid) {
                self.store.touch_liveness(&migration.uuid).await?;
            }
            return Ok(());
        }

        let Some(stream) = self.vrepl.read_stream(migration.uuid.as_str()).await? else {
            // The workflow may not have materialized yet; the stale monitor
            // catches the case where it never does.
            return Ok(());
        };

        // Adoption: a migration started by another tablet (failover) is
        // taken over by updating its owner and liveness indicator.
        if migration.tablet != self.config.tablet_alias {
            info!(
                uuid = %migration.uuid,
                previous_tablet = %migration.tablet,
                "adopting running migration"
            );
            self.store
                .set_tablet(&migration.uuid, &self.config.tablet_alias)
                .await?;
            self.owned.add(&migration.uuid);
        } else if !self.owned.contains(&migration.uuid) {
            self.owned.add(&migration.uuid);
        }

        // A shadow-table name beyond MySQL's identifier limit is beyond
        // saving: cancel, fire-and-forget, racing the next tick.
        if message_indicates_too_long_identifier(&stream.message) {
            let executor = self.clone();
            let uuid = migration.uuid.clone();
            let message = stream.message.clone();
            tokio::spawn(async move {
                if let Err(err) = executor.cancel_migration(&uuid, &message, false).await {
                    warn!(uuid = %uuid, error = %err, "background cancel failed");
                }
            });
            return Ok(());
        }

        if let Some(terminal_error) = self.vrepl.terminal_log_error(stream.id).await? {
            cancellations.push(CancellationRequest {
                uuid: migration.uuid.clone(),
                message: terminal_error,
            });
            return Ok(());
        }

        {
            let mut last_errors = self.vrepl_last_error.lock().await;
            let entry = last_errors
                .entry(migration.uuid.clone())
                .or_insert_with(|| LastError::new(self.config.stale_fail_after));
            if stream.is_in_error() {
                entry.record(&stream.message, now);
                if !entry.should_retry(now) {
                    cancellations.push(CancellationRequest {
                        uuid: migration.uuid.clone(),
                        message: format!(
                            "vreplication stream persistently failing: {}",
                            stream.message
                        ),
                    });
                    return Ok(());
                }
            } else {
                entry.clear();
            }
        }

        self.refresh_progress(migration, &stream, now).await?;
        self.store.touch_liveness(&migration.uuid).await?;

        let threshold = migration.cut_over_threshold_or(self.config.cutover_threshold);
        let ready = self.is_ready_to_cutover(&stream, threshold, now).await?;
        self.store
            .set_ready_to_complete(&migration.uuid, ready)
            .await?;

        if !ready || migration.postpone_completion {
            return Ok(());
        }
        if migration.strategy.is_in_order_completion()
            && pending.first().map(|m| &m.uuid) != Some(&migration.uuid)
        {
            return Ok(());
        }
        let decision = evaluate_cutover_attempt(migration, now);
        if !decision.should_attempt {
            return Ok(());
        }
        let should_force = decision.should_force || migration.force_cutover;
        match self
            .cut_over_vrepl_migration(migration, &stream, should_force)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_transient() => {
                info!(uuid = %migration.uuid, error = %err, "cut-over attempt yielded; will retry");
            }
            Err(err) => {
                warn!(uuid = %migration.uuid, error = %err, "cut-over attempt failed; will retry");
            }
        }
        Ok(())
    }

    async fn refresh_progress(
        &self,
        migration: &Migration,
        stream: &VReplStream,
        now: DateTime<Utc>,
    ) -> Result<(), RuntimeError> {
        let table_rows = self
            .pool
            .table_estimated_rows(&migration.mysql_table)
            .await
            .unwrap_or(migration.table_rows);
        let progress = if table_rows > 0 {
            ((stream.rows_copied as f64 / table_rows as f64) * 100.0).min(100.0)
        } else {
            0.0
        };
        let eta_seconds = estimate_eta_seconds(
            migration.started_timestamp,
            stream.rows_copied,
            table_rows,
            now,
        );
        self.store
            .update_progress(
                &migration.uuid,
                &ProgressUpdate {
                    rows_copied: stream.rows_copied,
                    table_rows,
                    progress,
                    eta_seconds,
                    vreplication_lag_seconds: stream.lag(now).as_secs_f64(),
                    vitess_liveness_indicator: stream.time_updated,
                },
            )
            .await?;
        Ok(())
    }
}

fn message_indicates_too_long_identifier(message: &str) -> bool {
    message.contains("1059")
        || (message.contains("Identifier name") && message.contains("too long"))
}

/// Row-copy rate since start projects the remaining copy time. `-1` when
/// there is no usable signal.
fn estimate_eta_seconds(
    started: Option<DateTime<Utc>>,
    rows_copied: u64,
    table_rows: i64,
    now: DateTime<Utc>,
) -> i64 {
    let Some(started) = started else { return -1 };
    let elapsed = (now - started).num_seconds();
    if elapsed <= 0 || rows_copied == 0 {
        return -1;
    }
    let remaining = (table_rows as i64) - (rows_copied as i64);
    if remaining <= 0 {
        return 0;
    }
    let rate = rows_copied as f64 / elapsed as f64;
    (remaining as f64 / rate).ceil() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn eta_estimation() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let started = Some(now - chrono::Duration::seconds(100));
        // 1000 rows in 100s => 10 rows/s; 9000 remaining => 900s.
        assert_eq!(estimate_eta_seconds(started, 1000, 10_000, now), 900);
        assert_eq!(estimate_eta_seconds(started, 10_000, 10_000, now), 0);
        assert_eq!(estimate_eta_seconds(started, 0, 10_000, now), -1);
        assert_eq!(estimate_eta_seconds(None, 1000, 10_000, now), -1);
    }

    #[test]
    fn too_long_identifier_detection() {
        assert!(message_indicates_too_long_identifier(
            "error 1059: Identifier name is too long"
        ));
        assert!(message_indicates_too_long_identifier(
            "Identifier name '_vt_vrp_x' is too long"
        ));
        assert!(!message_indicates_too_long_identifier("duplicate entry"));
    }
}
