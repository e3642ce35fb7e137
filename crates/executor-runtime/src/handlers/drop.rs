use crate::error::RuntimeError;
use crate::executor::Executor;
use crate::handlers::quoted;
use chrono::Utc;
use ddl_syntax::names::{self, GcTableState};
use ddl_syntax::parse::parse_ddl;
use model::migration::Migration;
use std::sync::Arc;
use tracing::info;

impl Executor {
    pub(crate) async fn execute_drop_task(self: Arc<Self>, migration: Migration) {
        if let Err(err) = self.execute_drop(&migration).await {
            self.fail_migration(&migration.uuid, &err.to_string()).await;
        }
    }

    /// DROP does not drop: the table is renamed into the GC namespace so the
    /// external table-GC component reclaims it later, and the data survives
    /// a REVERT in the meantime. Tables already in the GC namespace are
    /// dropped outright.
    async fn execute_drop(self: &Arc<Self>, migration: &Migration) -> Result<(), RuntimeError> {
        self.mark_migration_running(&migration.uuid).await?;
        let ddl = parse_ddl(&migration.migration_statement)?;
        let table = &migration.mysql_table;

        if names::is_internal_operation_table_name(table) {
            self.pool
                .exec(&format!("DROP TABLE IF EXISTS {}", quoted(table)))
                .await?;
            self.finalize_complete(&migration.uuid).await;
            return Ok(());
        }

        let eligible_at = Utc::now() + self.retention_for(migration);
        let (rename_statement, to_name) = names::generate_rename_statement_with_uuid(
            table,
            GcTableState::Hold,
            &migration.uuid,
            eligible_at,
        );
        // Record the artifact before renaming: a crash between the two steps
        // must leave the table discoverable.
        let mut updated = migration.clone();
        updated.prepend_artifact(&to_name);
        self.store
            .set_artifacts(&migration.uuid, &updated.artifacts)
            .await?;

        match self.pool.exec(&rename_statement).await {
            Ok(()) => {
                info!(uuid = %migration.uuid, table = %table, renamed_to = %to_name, "table renamed away");
            }
            Err(err) if err.is_missing_table() && ddl.if_exists => {
                self.store.set_artifacts(&migration.uuid, "").await?;
            }
            Err(err) => return Err(err.into()),
        }
        self.finalize_complete(&migration.uuid).await;
        Ok(())
    }
}
