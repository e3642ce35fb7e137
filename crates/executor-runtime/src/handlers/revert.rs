use crate::error::RuntimeError;
use crate::executor::Executor;
use crate::handlers::quoted;
use chrono::{Duration as ChronoDuration, Utc};
use ddl_syntax::names::{self, GcTableState};
use executor_core::collab::WorkflowSpec;
use model::error::ExecutorError;
use model::migration::Migration;
use model::status::{DdlAction, MigrationStatus};
use std::sync::Arc;
use tracing::info;

impl Executor {
    /// REVERT of a prior migration. Errors fail this migration, not the
    /// reverted one.
    pub(crate) async fn execute_revert(self: &Arc<Self>, migration: &Migration) -> Result<(), RuntimeError> {
        self.mark_migration_running(&migration.uuid).await?;
        if let Err(err) = self.execute_revert_inner(migration).await {
            self.fail_migration(&migration.uuid, &err.to_string()).await;
        }
        Ok(())
    }

    async fn execute_revert_inner(self: &Arc<Self>, migration: &Migration) -> Result<(), RuntimeError> {
        let revert_uuid = migration
            .revert_uuid
            .as_ref()
            .ok_or_else(|| RuntimeError::Internal("revert carries no target uuid".to_string()))?;
        let target = self.read_migration_required(revert_uuid).await?;
        self.validate_migration_revertible(migration, &target).await?;

        match target.ddl_action {
            DdlAction::Create => {
                if target.artifacts.is_empty() {
                    // IF NOT EXISTS created nothing; there is nothing to
                    // undo.
                    info!(uuid = %migration.uuid, "reverted CREATE created no table; noop");
                    self.finalize_complete(&migration.uuid).await;
                    return Ok(());
                }
                let eligible_at = Utc::now() + self.retention_for(migration);
                let (rename_statement, to_name) = names::generate_rename_statement_with_uuid(
                    &target.mysql_table,
                    GcTableState::Hold,
                    &migration.uuid,
                    eligible_at,
                );
                let mut updated = migration.clone();
                updated.prepend_artifact(&to_name);
                self.store
                    .set_artifacts(&migration.uuid, &updated.artifacts)
                    .await?;
                self.pool.exec(&rename_statement).await?;
                self.finalize_complete(&migration.uuid).await;
                Ok(())
            }
            DdlAction::Drop => {
                let artifact = first_artifact(&target, "no renamed-away table to restore")?;
                let rename_statement = format!(
                    "RENAME TABLE {} TO {}",
                    quoted(&artifact),
                    quoted(&target.mysql_table)
                );
                self.pool.exec(&rename_statement).await?;
                self.finalize_complete(&migration.uuid).await;
                Ok(())
            }
            DdlAction::Alter if target.is_view => {
                let artifact = first_artifact(&target, "no artifact view to restore")?;
                let swap = names::generate_gc_table_name(
                    GcTableState::Hold,
                    &migration.uuid,
                    Utc::now() + self.retention_for(migration) + ChronoDuration::seconds(1),
                );
                let live = quoted(&target.mysql_table);
                let rename_statement = format!(
                    "RENAME TABLE {live} TO {swap_q}, {artifact_q} TO {live}, {swap_q} TO {artifact_q}",
                    swap_q = quoted(&swap),
                    artifact_q = quoted(&artifact),
                );
                // After the swap the artifact name holds the pre-revert view.
                let mut updated = migration.clone();
                updated.prepend_artifact(&artifact);
                self.store
                    .set_artifacts(&migration.uuid, &updated.artifacts)
                    .await?;
                self.pool.exec(&rename_statement).await?;
                self.finalize_complete(&migration.uuid).await;
                Ok(())
            }
            DdlAction::Alter => {
                // Table ALTER: run vreplication in revert mode. The reverted
                // migration's workflow row still names the table that now
                // holds the pre-image (its former shadow), and its position
                // marks where the reverse stream resumes from.
                let stream = self
                    .vrepl
                    .read_stream(target.uuid.as_str())
                    .await?
                    .filter(|s| !s.pos.is_empty())
                    .ok_or_else(|| {
                        ExecutorError::failed_precondition(format!(
                            "missing stored vreplication position for migration {}",
                            target.uuid
                        ))
                    })?;
                if stream.target_table.is_empty() {
                    return Err(ExecutorError::failed_precondition(format!(
                        "cannot revert migration {}: pre-image table unknown",
                        target.uuid
                    ))
                    .into());
                }
                self.store
                    .set_artifacts(&migration.uuid, &stream.target_table)
                    .await?;
                let spec = WorkflowSpec {
                    workflow: migration.uuid.to_string(),
                    source_table: target.mysql_table.clone(),
                    target_table: stream.target_table.clone(),
                    revert_binlog_pos: Some(stream.pos.clone()),
                };
                self.start_vrepl_workflow(&migration.uuid, spec).await
            }
            DdlAction::Revert => Err(RuntimeError::Internal(
                "revert of a revert should have been resolved at review".to_string(),
            )),
        }
    }

    /// The revert preconditions of one migration over another.
    async fn validate_migration_revertible(
        &self,
        migration: &Migration,
        target: &Migration,
    ) -> Result<(), RuntimeError> {
        if target.status != MigrationStatus::Complete {
            return Err(ExecutorError::failed_precondition(format!(
                "can only revert a complete migration; migration {} is {}",
                target.uuid, target.status
            ))
            .into());
        }
        if target.ddl_action == DdlAction::Alter
            && !target.is_view
            && !target.runs_vreplication()
        {
            return Err(ExecutorError::failed_precondition(format!(
                "can only revert a migration executed by the online or vitess strategy; \
                 migration {} ran {}",
                target.uuid, target.strategy.strategy
            ))
            .into());
        }
        let pending = self.store.pending_migrations().await?;
        if let Some(conflict) = pending
            .iter()
            .find(|m| m.uuid != migration.uuid && m.mysql_table == target.mysql_table)
        {
            return Err(ExecutorError::failed_precondition(format!(
                "found pending migration {} on table {}",
                conflict.uuid, target.mysql_table
            ))
            .into());
        }
        let last_complete = self.store.last_complete_on_table(&target.mysql_table).await?;
        match last_complete {
            Some(last) if last.uuid == target.uuid => Ok(()),
            _ => Err(ExecutorError::failed_precondition(format!(
                "only the last complete migration on table {} may be reverted",
                target.mysql_table
            ))
            .into()),
        }
    }
}

fn first_artifact(target: &Migration, missing: &str) -> Result<String, RuntimeError> {
    target.artifact_tables().into_iter().next().ok_or_else(|| {
        ExecutorError::failed_precondition(format!(
            "cannot revert migration {}: {missing}",
            target.uuid
        ))
        .into()
    })
}
