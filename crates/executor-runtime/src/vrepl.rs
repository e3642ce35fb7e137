use crate::error::RuntimeError;
use crate::executor::Executor;
use crate::handlers::quoted;
use chrono::{DateTime, Utc};
use ddl_syntax::analysis::{analyze_schema_change, parse_create_table};
use ddl_syntax::names::internal_vrepl_table_hint;
use ddl_syntax::parse::{DdlStatement, mentions_auto_increment};
use ddl_syntax::rewrite::{retarget_to_table, rewrite_alter_constraints};
use executor_core::collab::{VReplStream, WorkflowSpec};
use executor_core::store::AnalysisUpdate;
use model::error::ExecutorError;
use model::migration::Migration;
use model::uuid::OnlineDdlUuid;
use std::time::Duration;
use tracing::{debug, info, warn};

impl Executor {
    /// Sets up the vreplication ALTER: builds the shadow table, applies the
    /// user's ALTER to it, analyzes the change, propagates AUTO_INCREMENT
    /// and starts the row-copy stream. The running-migration reviewer takes
    /// it from there.
    pub(crate) async fn execute_vrepl_alter(
        &self,
        migration: &Migration,
        ddl: &DdlStatement,
    ) -> Result<(), RuntimeError> {
        // A fresh attempt supersedes any prior workflow under this uuid.
        self.terminate_vrepl_migration(&migration.uuid).await;

        if !self.is_primary_tablet() {
            return Err(ExecutorError::NotWritableTablet.into());
        }

        let table = &migration.mysql_table;
        let shadow = internal_vrepl_table_hint(&migration.uuid, Utc::now());

        let fk_count = self.pool.foreign_key_participation(table).await?;
        if fk_count > 0 {
            if !migration.strategy.is_allow_foreign_keys() {
                return Err(ExecutorError::failed_precondition(format!(
                    "table {table} participates in {fk_count} foreign key(s); \
                     rejecting migration (see --unsafe-allow-foreign-keys)"
                ))
                .into());
            }
            let preserve = self
                .pool
                .global_variable("rename_table_preserve_foreign_key")
                .await?;
            if !matches!(preserve.as_deref(), Some("ON") | Some("1")) {
                return Err(ExecutorError::failed_precondition(
                    "server does not preserve foreign keys over RENAME TABLE \
                     (rename_table_preserve_foreign_key is unset)",
                )
                .into());
            }
        }

        self.pool
            .exec(&format!(
                "CREATE TABLE {} LIKE {}",
                quoted(&shadow),
                quoted(table)
            ))
            .await?;
        let mut updated = migration.clone();
        updated.prepend_artifact(&shadow);
        self.store
            .set_artifacts(&migration.uuid, &updated.artifacts)
            .await?;

        let mut alter_shadow = retarget_to_table(ddl, &shadow)?;
        match rewrite_alter_constraints(&alter_shadow, table) {
            Ok((rewritten, _)) => alter_shadow = rewritten,
            Err(err) => debug!(uuid = %migration.uuid, error = %err, "constraint rewrite skipped"),
        }

        let mut conn = self.pool.acquire().await?;
        if migration.strategy.is_allow_zero_in_date() {
            conn.exec(
                "SET @@session.sql_mode=REPLACE(REPLACE(@@session.sql_mode, \
                 'NO_ZERO_DATE', ''), 'NO_ZERO_IN_DATE', '')",
            )
            .await?;
        }
        if migration.strategy.is_allow_foreign_keys() {
            conn.exec("SET foreign_key_checks=0").await?;
        }
        conn.exec(&alter_shadow).await?;
        drop(conn);

        match self.analyze_shadow_structure(table, &shadow).await {
            Ok(analysis) => self.store.write_analysis(&migration.uuid, &analysis).await?,
            Err(err) => {
                warn!(uuid = %migration.uuid, error = %err, "schema analysis unavailable");
                let fallback = AnalysisUpdate {
                    revertible_notes: "structure analysis unavailable".to_string(),
                    ..Default::default()
                };
                self.store.write_analysis(&migration.uuid, &fallback).await?;
            }
        }

        if !mentions_auto_increment(&ddl.raw) {
            if let Some(value) = self.pool.table_auto_increment(table).await? {
                if value > 1 {
                    self.pool
                        .exec(&format!(
                            "ALTER TABLE {} AUTO_INCREMENT={value}",
                            quoted(&shadow)
                        ))
                        .await?;
                }
            }
        }

        let spec = WorkflowSpec {
            workflow: migration.uuid.to_string(),
            source_table: table.clone(),
            target_table: shadow,
            revert_binlog_pos: None,
        };
        self.start_vrepl_workflow(&migration.uuid, spec).await
    }

    /// Registers and starts a workflow, taking ownership of the migration.
    pub(crate) async fn start_vrepl_workflow(
        &self,
        uuid: &OnlineDdlUuid,
        spec: WorkflowSpec,
    ) -> Result<(), RuntimeError> {
        let stream_id = self.vrepl.create_workflow(&spec).await?;
        self.vrepl.start_workflow(uuid.as_str()).await?;
        self.owned.add(uuid);
        self.store.touch_liveness(uuid).await?;
        info!(
            uuid = %uuid,
            stream_id,
            target = %spec.target_table,
            "vreplication workflow started"
        );
        Ok(())
    }

    async fn analyze_shadow_structure(
        &self,
        table: &str,
        shadow: &str,
    ) -> Result<AnalysisUpdate, RuntimeError> {
        let source_sql = self.pool.show_create(table).await?;
        let shadow_sql = self.pool.show_create(shadow).await?;
        let source = parse_create_table(&source_sql)?;
        let shadow_def = parse_create_table(&shadow_sql)?;
        let analysis = analyze_schema_change(&source, &shadow_def);
        Ok(AnalysisUpdate {
            added_unique_keys: analysis.added_unique_keys,
            removed_unique_keys: analysis.removed_unique_keys,
            removed_unique_key_names: analysis.removed_unique_key_names.join(","),
            removed_foreign_key_names: analysis.removed_foreign_key_names.join(","),
            dropped_no_default_column_names: analysis.dropped_no_default_column_names.join(","),
            expanded_column_names: analysis.expanded_column_names.join(","),
            revertible_notes: analysis.revertible_notes.join("; "),
        })
    }

    /// A workflow is ready to cut over iff it reports a position, its lag is
    /// within the threshold, and row copy has finished.
    pub(crate) async fn is_ready_to_cutover(
        &self,
        stream: &VReplStream,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, RuntimeError> {
        if stream.pos.is_empty() {
            return Ok(false);
        }
        if stream.lag(now) > threshold {
            return Ok(false);
        }
        Ok(self.vrepl.copy_state_row_count(stream.id).await? == 0)
    }
}
