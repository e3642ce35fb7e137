use crate::error::RuntimeError;
use crate::executor::Executor;
use chrono::Utc;
use ddl_syntax::names::{GcTableState, generate_gc_table_name};
use ddl_syntax::parse::parse_ddl;
use ddl_syntax::rewrite::rewrite_create_table_constraints;
use model::migration::Migration;
use std::sync::Arc;
use tracing::{info, warn};

impl Executor {
    pub(crate) async fn execute_create_task(self: Arc<Self>, migration: Migration) {
        if let Err(err) = self.execute_create(&migration).await {
            self.fail_migration(&migration.uuid, &err.to_string()).await;
        }
    }

    async fn execute_create(self: &Arc<Self>, migration: &Migration) -> Result<(), RuntimeError> {
        self.mark_migration_running(&migration.uuid).await?;
        let ddl = parse_ddl(&migration.migration_statement)?;
        let exists = self.pool.table_exists(&migration.mysql_table).await?;

        // CREATE OR REPLACE VIEW over an existing view is an ALTER in
        // disguise: go through the artifact-swap protocol.
        if ddl.is_view && ddl.or_replace && exists {
            return self.execute_view_swap(migration, &ddl).await;
        }

        let mut statement = ddl.raw.clone();
        if !ddl.is_view {
            match rewrite_create_table_constraints(&ddl.raw, &migration.mysql_table) {
                Ok((rewritten, renames)) => {
                    if !renames.is_empty() {
                        info!(
                            uuid = %migration.uuid,
                            renames = renames.len(),
                            "constraint names made deterministic"
                        );
                    }
                    statement = rewritten;
                }
                Err(err) => {
                    warn!(uuid = %migration.uuid, error = %err, "constraint rewrite skipped");
                }
            }
        }

        // A sentry artifact, never materialized as a table: its presence on
        // the row tells a later REVERT that this migration actually created
        // the table.
        let sentry = generate_gc_table_name(
            GcTableState::Hold,
            &migration.uuid,
            Utc::now() + self.retention_for(migration),
        );
        self.store.set_artifacts(&migration.uuid, &sentry).await?;

        if exists {
            if migration.strategy.is_declarative() && !ddl.if_not_exists {
                // The table is already there; structural reconciliation is
                // the schema-diff service's job, not this executor's.
                self.store.set_artifacts(&migration.uuid, "").await?;
                self.finalize_complete(&migration.uuid).await;
                return Ok(());
            }
            if ddl.if_not_exists {
                self.store.set_artifacts(&migration.uuid, "").await?;
            }
        }

        self.pool.exec(&statement).await?;
        self.finalize_complete(&migration.uuid).await;
        Ok(())
    }
}
