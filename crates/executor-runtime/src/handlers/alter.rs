use crate::error::RuntimeError;
use crate::executor::Executor;
use ddl_syntax::parse::parse_ddl;
use model::migration::Migration;
use model::strategy::DdlStrategy;
use std::sync::Arc;

impl Executor {
    /// ALTER dispatch: view swap, special plan, or strategy execution.
    /// Errors fail the migration rather than the tick.
    pub(crate) async fn execute_alter(self: &Arc<Self>, migration: &Migration) -> Result<(), RuntimeError> {
        self.mark_migration_running(&migration.uuid).await?;
        if let Err(err) = self.execute_alter_inner(migration).await {
            self.fail_migration(&migration.uuid, &err.to_string()).await;
        }
        Ok(())
    }

    async fn execute_alter_inner(self: &Arc<Self>, migration: &Migration) -> Result<(), RuntimeError> {
        let ddl = parse_ddl(&migration.migration_statement)?;

        if ddl.is_view {
            if !self.pool.table_exists(&migration.mysql_table).await? {
                // Run as-is so the server returns the authentic error.
                self.pool.exec(&ddl.raw).await?;
                self.finalize_complete(&migration.uuid).await;
                return Ok(());
            }
            return self.execute_view_swap(migration, &ddl).await;
        }

        // Second special-plan evaluation; the reviewer's verdict may have
        // gone stale if server state changed. Finding no plan here falls
        // through to the regular strategy path.
        if let Some(plan) = self.plan_special_alter(&ddl) {
            return self.execute_special_plan(migration, &ddl, plan).await;
        }

        match migration.strategy.strategy {
            DdlStrategy::Online | DdlStrategy::Vitess => {
                self.execute_vrepl_alter(migration, &ddl).await
            }
            DdlStrategy::MySql | DdlStrategy::Direct => {
                // In-place server-side ALTER; potentially hours. Runs in its
                // own task, the row stays `running` until it resolves.
                let executor = self.clone();
                let migration = migration.clone();
                tokio::spawn(async move {
                    match executor.pool.exec(&migration.migration_statement).await {
                        Ok(()) => executor.finalize_complete(&migration.uuid).await,
                        Err(err) => {
                            executor
                                .fail_migration(&migration.uuid, &err.to_string())
                                .await
                        }
                    }
                });
                Ok(())
            }
            DdlStrategy::Declarative => Err(RuntimeError::Internal(
                "declarative ALTER should have been rejected at review".to_string(),
            )),
        }
    }
}
