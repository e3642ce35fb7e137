use crate::error::RuntimeError;
use crate::executor::Executor;
use crate::handlers::quoted;
use chrono::{Duration as ChronoDuration, Utc};
use ddl_syntax::names::{GcTableState, generate_gc_table_name};
use ddl_syntax::parse::DdlStatement;
use ddl_syntax::rewrite::view_as_create;
use executor_core::store::ReviewUpdate;
use model::migration::Migration;
use model::status::DdlAction;
use std::sync::Arc;
use tracing::info;

impl Executor {
    /// ALTER VIEW (and CREATE OR REPLACE VIEW over an existing view): the
    /// desired definition is materialized under an artifact name and swapped
    /// into place with a three-way RENAME, which is atomic. The old view
    /// survives under the artifact name for GC and REVERT.
    pub(crate) async fn execute_view_swap(
        self: &Arc<Self>,
        migration: &Migration,
        ddl: &DdlStatement,
    ) -> Result<(), RuntimeError> {
        let now = Utc::now();
        let retention = self.retention_for(migration);
        let artifact = generate_gc_table_name(GcTableState::Hold, &migration.uuid, now + retention);
        let swap = generate_gc_table_name(
            GcTableState::Hold,
            &migration.uuid,
            now + retention + ChronoDuration::seconds(1),
        );

        let create_statement = view_as_create(ddl, &artifact)?;
        self.pool.exec(&create_statement).await?;

        let mut updated = migration.clone();
        updated.prepend_artifact(&artifact);
        self.store
            .set_artifacts(&migration.uuid, &updated.artifacts)
            .await?;

        let live = quoted(&migration.mysql_table);
        let rename_statement = format!(
            "RENAME TABLE {live} TO {swap_q}, {artifact_q} TO {live}, {swap_q} TO {artifact_q}",
            swap_q = quoted(&swap),
            artifact_q = quoted(&artifact),
        );
        self.pool.exec(&rename_statement).await?;

        // However submitted, the row reads as an ALTER of the view.
        self.store
            .set_reviewed(
                &migration.uuid,
                &ReviewUpdate {
                    ddl_action: DdlAction::Alter,
                    mysql_table: migration.mysql_table.clone(),
                    is_view: true,
                    is_immediate_operation: true,
                },
            )
            .await?;
        info!(uuid = %migration.uuid, view = %migration.mysql_table, "view swapped");
        self.finalize_complete(&migration.uuid).await;
        Ok(())
    }
}
