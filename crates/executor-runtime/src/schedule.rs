use crate::error::RuntimeError;
use crate::executor::Executor;
use model::migration::Migration;
use model::status::{DdlAction, MigrationStatus};
use std::sync::Arc;
use tracing::info;

/// Two migrations conflict when they touch the same table, when neither
/// allows concurrency, or when the candidate is an ALTER and some running
/// migration has not yet reached its first ready-to-complete moment.
pub(crate) fn is_conflicting(candidate: &Migration, running: &Migration) -> bool {
    if !candidate.mysql_table.is_empty() && candidate.mysql_table == running.mysql_table {
        return true;
    }
    if !candidate.strategy.is_allow_concurrent() && !running.strategy.is_allow_concurrent() {
        return true;
    }
    if candidate.ddl_action == DdlAction::Alter && !running.was_ready_to_complete {
        return true;
    }
    false
}

impl Executor {
    /// Promotes at most one reviewed `queued` row to `ready` per tick.
    pub(crate) async fn schedule_next_migration(&self) -> Result<(), RuntimeError> {
        let _guard = self.migration_mutex.lock().await;
        let queued = self.store.migrations_by_status(MigrationStatus::Queued).await?;
        for migration in &queued {
            if migration.reviewed_timestamp.is_none() || migration.postpone_launch {
                continue;
            }
            if migration.is_immediate_operation && !migration.ready_to_complete {
                self.store
                    .set_ready_to_complete(&migration.uuid, true)
                    .await?;
            }
            // An immediate operation with postponed completion stays queued:
            // running it would complete it.
            if migration.is_immediate_operation && migration.postpone_completion {
                continue;
            }
            self.store.mark_ready(&migration.uuid).await?;
            info!(uuid = %migration.uuid, "migration scheduled");
            self.trigger_next_check();
            return Ok(());
        }
        Ok(())
    }

    /// Dispatches at most one `ready` migration that conflicts with nothing
    /// currently running.
    pub(crate) async fn run_next_migration(self: &Arc<Self>) -> Result<(), RuntimeError> {
        let candidate = {
            let _guard = self.migration_mutex.lock().await;
            let running = self.store.migrations_by_status(MigrationStatus::Running).await?;
            if running.len() >= self.config.effective_max_concurrent() {
                return Ok(());
            }
            let ready = self.store.migrations_by_status(MigrationStatus::Ready).await?;
            let pending = self.store.pending_migrations().await?;

            let mut picked = None;
            for candidate in ready {
                if running.iter().any(|r| is_conflicting(&candidate, r)) {
                    continue;
                }
                if candidate.strategy.is_in_order_completion() {
                    if !candidate.migration_context.is_empty() {
                        let failures = self
                            .store
                            .terminal_failures_in_context(&candidate.migration_context)
                            .await?;
                        if let Some(failure) = failures.first() {
                            self.fail_migration(
                                &candidate.uuid,
                                &format!(
                                    "migration {} in same context has failed/cancelled",
                                    failure.uuid
                                ),
                            )
                            .await;
                            continue;
                        }
                    }
                    // An immediate in-order migration must wait for its turn
                    // at the head of the pending queue.
                    if candidate.is_immediate_operation
                        && pending.first().map(|m| &m.uuid) != Some(&candidate.uuid)
                    {
                        continue;
                    }
                }
                picked = Some(candidate);
                break;
            }
            picked
        };

        let Some(migration) = candidate else {
            return Ok(());
        };
        info!(
            uuid = %migration.uuid,
            action = %migration.ddl_action,
            "running migration"
        );
        self.dispatch_migration(migration).await
    }

    /// Routes by effective action; reverts are marked by their target uuid.
    /// CREATE and DROP run in background tasks; ALTER and REVERT set up
    /// synchronously within the tick.
    async fn dispatch_migration(self: &Arc<Self>, migration: Migration) -> Result<(), RuntimeError> {
        if migration.revert_uuid.is_some() {
            return self.execute_revert(&migration).await;
        }
        match migration.ddl_action {
            DdlAction::Drop => {
                let executor = self.clone();
                tokio::spawn(async move {
                    executor.execute_drop_task(migration).await;
                });
                Ok(())
            }
            DdlAction::Create => {
                let executor = self.clone();
                tokio::spawn(async move {
                    executor.execute_create_task(migration).await;
                });
                Ok(())
            }
            DdlAction::Alter => self.execute_alter(&migration).await,
            DdlAction::Revert => {
                // Unreachable for reviewed rows; reviewer rewrites the action.
                self.execute_revert(&migration).await
            }
        }
    }

    /// Requeues migrations that failed on another tablet (failover case).
    pub(crate) async fn retry_tablet_failure_migrations(&self) -> Result<(), RuntimeError> {
        let candidates = self
            .store
            .tablet_failure_migrations(&self.config.tablet_alias)
            .await?;
        for migration in &candidates {
            info!(uuid = %migration.uuid, "retrying migration after tablet failure");
            self.store
                .retry_migration(&migration.uuid, &self.config.tablet_alias)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::strategy::{DdlStrategy, DdlStrategySetting};
    use model::uuid::OnlineDdlUuid;

    fn migration(table: &str, action: DdlAction, options: &str) -> Migration {
        Migration::new_queued(
            OnlineDdlUuid::generate(),
            "commerce",
            "0",
            "vt_commerce",
            table,
            "ALTER TABLE t ENGINE=InnoDB",
            DdlStrategySetting::new(DdlStrategy::Vitess, options),
            action,
            "",
        )
    }

    #[test]
    fn same_table_always_conflicts() {
        let candidate = migration("customers", DdlAction::Drop, "--allow-concurrent");
        let mut running = migration("customers", DdlAction::Alter, "--allow-concurrent");
        running.was_ready_to_complete = true;
        assert!(is_conflicting(&candidate, &running));
    }

    #[test]
    fn concurrency_requires_at_least_one_allow_concurrent() {
        let candidate = migration("a", DdlAction::Drop, "");
        let running = migration("b", DdlAction::Drop, "");
        assert!(is_conflicting(&candidate, &running));

        let candidate = migration("a", DdlAction::Drop, "--allow-concurrent");
        assert!(!is_conflicting(&candidate, &running));
    }

    #[test]
    fn alter_waits_for_running_to_reach_ready_to_complete() {
        let candidate = migration("a", DdlAction::Alter, "--allow-concurrent");
        let mut running = migration("b", DdlAction::Alter, "--allow-concurrent");
        running.was_ready_to_complete = false;
        assert!(is_conflicting(&candidate, &running));
        running.was_ready_to_complete = true;
        assert!(!is_conflicting(&candidate, &running));
    }
}
