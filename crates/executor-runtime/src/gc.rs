use crate::api::strip_log_host_prefix;
use crate::error::RuntimeError;
use crate::executor::Executor;
use chrono::{Duration as ChronoDuration, Utc};
use ddl_syntax::names::{GcTableState, generate_rename_statement_with_uuid};
use model::migration::Migration;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

impl Executor {
    /// Artifact garbage collection: terminal migrations past their retention
    /// window have their auxiliary tables renamed into the GC namespace for
    /// the external table-GC component, their log files removed and their
    /// replication rows deleted.
    pub(crate) async fn gc_artifacts(&self) -> Result<(), RuntimeError> {
        if !self.fix_completed_done.swap(true, Ordering::SeqCst) {
            let fixed = self.store.fix_completed_timestamps().await?;
            if fixed > 0 {
                info!(rows = fixed, "assigned missing completed timestamps");
            }
        }

        let candidates = self
            .store
            .artifact_cleanup_candidates(self.config.retain_artifacts.as_secs() as i64)
            .await?;
        for migration in &candidates {
            if let Err(err) = self.gc_migration_artifacts(migration).await {
                warn!(uuid = %migration.uuid, error = %err, "artifact GC failed");
            }
        }
        Ok(())
    }

    async fn gc_migration_artifacts(&self, migration: &Migration) -> Result<(), RuntimeError> {
        let artifacts = migration.artifact_tables();
        let now = Utc::now();
        let mut remaining = artifacts.clone();
        let mut renamed_any = false;

        for (index, artifact) in artifacts.iter().enumerate() {
            // Distinct, strictly decreasing timestamps keep the generated GC
            // names unique within this pass.
            let eligible_at = now - ChronoDuration::seconds(index as i64);
            let (rename_statement, to_name) = generate_rename_statement_with_uuid(
                artifact,
                GcTableState::Hold,
                &migration.uuid,
                eligible_at,
            );
            match self.pool.exec(&rename_statement).await {
                Ok(()) => {
                    info!(uuid = %migration.uuid, artifact = %artifact, renamed_to = %to_name, "artifact renamed for GC");
                    renamed_any = true;
                }
                Err(err) if err.is_missing_table() => {
                    // Sentries and swapped-away names may no longer exist.
                    debug!(uuid = %migration.uuid, artifact = %artifact, "artifact already gone");
                }
                Err(err) => return Err(err.into()),
            }
            remaining.retain(|a| a != artifact);
            self.store
                .set_artifacts(&migration.uuid, &remaining.join(","))
                .await?;
        }
        if renamed_any {
            if let Err(err) = self.tablets.request_gc_check().await {
                debug!(error = %err, "table-GC notification failed");
            }
        }

        if !migration.log_path.is_empty() {
            let path = strip_log_host_prefix(&migration.log_path);
            if let Err(err) = tokio::fs::remove_file(path).await {
                debug!(uuid = %migration.uuid, error = %err, "cannot remove migration log");
            }
        }

        if let Err(err) = self.vrepl.delete_workflow(migration.uuid.as_str()).await {
            warn!(uuid = %migration.uuid, error = %err, "cannot delete vreplication workflow");
        }

        self.store.stamp_cleanup(&migration.uuid).await?;
        info!(uuid = %migration.uuid, "migration artifacts collected");
        Ok(())
    }
}
