use crate::error::to_db_error;
use crate::row::to_sql_row;
use async_trait::async_trait;
use executor_core::error::DbError;
use executor_core::store::{
    AnalysisUpdate, MetadataStore, MigrationFilter, ProgressUpdate, ReviewUpdate,
};
use model::migration::Migration;
use model::status::MigrationStatus;
use model::uuid::OnlineDdlUuid;
use mysql_async::prelude::Queryable;
use mysql_async::{Params, Pool, Row as MySqlRow, params};

const SQL_SCHEMA: &str = include_str!("sql/schema_migrations.sql");

const SQL_INSERT_MIGRATION: &str = "INSERT INTO _vt.schema_migrations (
        migration_uuid, keyspace, shard, mysql_schema, mysql_table,
        migration_statement, strategy, options, ddl_action, is_view,
        revert_uuid, migration_context, migration_status, tablet,
        requested_timestamp, postpone_launch, postpone_completion,
        retain_artifacts_seconds, cutover_threshold_seconds, log_path,
        artifacts, special_plan, message, stage,
        removed_unique_key_names, removed_foreign_key_names,
        dropped_no_default_column_names, expanded_column_names,
        revertible_notes
    ) VALUES (
        :migration_uuid, :keyspace, :shard, :mysql_schema, :mysql_table,
        :migration_statement, :strategy, :options, :ddl_action, :is_view,
        :revert_uuid, :migration_context, :migration_status, :tablet,
        NOW(6), :postpone_launch, :postpone_completion,
        :retain_artifacts_seconds, :cutover_threshold_seconds, :log_path,
        '', '', '', '', '', '', '', '', ''
    )";

const SQL_SELECT_MIGRATION: &str =
    "SELECT * FROM _vt.schema_migrations WHERE migration_uuid=:migration_uuid";

const SQL_SELECT_PENDING: &str = "SELECT * FROM _vt.schema_migrations \
     WHERE migration_status IN ('queued','ready','running') ORDER BY id";

const SQL_SELECT_BY_STATUS: &str =
    "SELECT * FROM _vt.schema_migrations WHERE migration_status=:migration_status ORDER BY id";

const SQL_SELECT_UNREVIEWED: &str = "SELECT * FROM _vt.schema_migrations \
     WHERE migration_status='queued' AND reviewed_timestamp IS NULL ORDER BY id";

const SQL_SELECT_RECENT: &str = "SELECT * FROM _vt.schema_migrations \
     WHERE requested_timestamp > NOW() - INTERVAL 3 WEEK ORDER BY id DESC";

const SQL_SELECT_ALL: &str = "SELECT * FROM _vt.schema_migrations ORDER BY id DESC";

const SQL_SELECT_BY_CONTEXT: &str = "SELECT * FROM _vt.schema_migrations \
     WHERE migration_context=:migration_context ORDER BY id DESC";

const SQL_SELECT_LAST_COMPLETE_ON_TABLE: &str = "SELECT * FROM _vt.schema_migrations \
     WHERE migration_status='complete' AND mysql_table=:mysql_table \
     ORDER BY completed_timestamp DESC, id DESC LIMIT 1";

const SQL_SELECT_CONTEXT_FAILURES: &str = "SELECT * FROM _vt.schema_migrations \
     WHERE migration_status IN ('failed','cancelled') AND migration_context=:migration_context \
     ORDER BY id";

const SQL_SELECT_TABLET_FAILURES: &str = "SELECT * FROM _vt.schema_migrations \
     WHERE migration_status='failed' AND tablet_failure=1 AND tablet != :tablet ORDER BY id";

const SQL_SELECT_CLEANUP_CANDIDATES: &str = "SELECT * FROM _vt.schema_migrations \
     WHERE migration_status IN ('complete','failed','cancelled') \
       AND cleanup_timestamp IS NULL \
       AND completed_timestamp <= TIMESTAMPADD(SECOND, \
            -CASE WHEN retain_artifacts_seconds > 0 \
                  THEN retain_artifacts_seconds ELSE :default_retention END, \
            NOW(6)) \
     ORDER BY id";

const SQL_SET_REVIEWED: &str = "UPDATE _vt.schema_migrations \
     SET ddl_action=:ddl_action, mysql_table=:mysql_table, is_view=:is_view, \
         is_immediate_operation=:is_immediate_operation, reviewed_timestamp=NOW(6) \
     WHERE migration_uuid=:migration_uuid";

const SQL_MARK_READY: &str = "UPDATE _vt.schema_migrations \
     SET migration_status='ready', ready_timestamp=NOW(6) \
     WHERE migration_uuid=:migration_uuid";

const SQL_MARK_RUNNING: &str = "UPDATE _vt.schema_migrations \
     SET migration_status='running', tablet=:tablet, \
         started_timestamp=IFNULL(started_timestamp, NOW(6)), liveness_timestamp=NOW(6) \
     WHERE migration_uuid=:migration_uuid";

const SQL_MARK_TERMINAL: &str = "UPDATE _vt.schema_migrations \
     SET migration_status=:migration_status, message=:message, \
         started_timestamp=IFNULL(started_timestamp, NOW(6)), \
         completed_timestamp=NOW(6) \
     WHERE migration_uuid=:migration_uuid";

const SQL_RETRY_MIGRATION: &str = "UPDATE _vt.schema_migrations \
     SET migration_status='queued', tablet=:tablet, retries=retries+1, \
         tablet_failure=0, message='', \
         ready_timestamp=NULL, started_timestamp=NULL, liveness_timestamp=NULL, \
         completed_timestamp=NULL, cleanup_timestamp=NULL, cancelled_timestamp=NULL \
     WHERE migration_uuid=:migration_uuid AND migration_status IN ('failed','cancelled')";

const SQL_UPDATE_MESSAGE: &str =
    "UPDATE _vt.schema_migrations SET message=:message WHERE migration_uuid=:migration_uuid";

const SQL_UPDATE_STAGE: &str =
    "UPDATE _vt.schema_migrations SET stage=:stage WHERE migration_uuid=:migration_uuid";

const SQL_TOUCH_LIVENESS: &str = "UPDATE _vt.schema_migrations \
     SET liveness_timestamp=NOW(6) WHERE migration_uuid=:migration_uuid";

const SQL_UPDATE_PROGRESS: &str = "UPDATE _vt.schema_migrations \
     SET rows_copied=:rows_copied, table_rows=:table_rows, progress=:progress, \
         eta_seconds=:eta_seconds, vreplication_lag_seconds=:vreplication_lag_seconds, \
         vitess_liveness_indicator=:vitess_liveness_indicator \
     WHERE migration_uuid=:migration_uuid";

const SQL_WRITE_ANALYSIS: &str = "UPDATE _vt.schema_migrations \
     SET added_unique_keys=:added_unique_keys, removed_unique_keys=:removed_unique_keys, \
         removed_unique_key_names=:removed_unique_key_names, \
         removed_foreign_key_names=:removed_foreign_key_names, \
         dropped_no_default_column_names=:dropped_no_default_column_names, \
         expanded_column_names=:expanded_column_names, revertible_notes=:revertible_notes \
     WHERE migration_uuid=:migration_uuid";

const SQL_SET_READY_TO_COMPLETE: &str = "UPDATE _vt.schema_migrations \
     SET ready_to_complete=:ready, \
         was_ready_to_complete=was_ready_to_complete OR :ready, \
         ready_to_complete_timestamp=IF(:ready AND ready_to_complete_timestamp IS NULL, \
                                        NOW(6), ready_to_complete_timestamp) \
     WHERE migration_uuid=:migration_uuid";

const SQL_SET_CANCELLED_TIMESTAMP: &str = "UPDATE _vt.schema_migrations \
     SET cancelled_timestamp=NOW(6) WHERE migration_uuid=:migration_uuid";

const SQL_CLEAR_POSTPONE_COMPLETION: &str = "UPDATE _vt.schema_migrations \
     SET postpone_completion=0 \
     WHERE migration_uuid=:migration_uuid \
       AND migration_status IN ('queued','ready','running')";

const SQL_CLEAR_POSTPONE_LAUNCH: &str = "UPDATE _vt.schema_migrations \
     SET postpone_launch=0 \
     WHERE migration_uuid=:migration_uuid AND migration_status='queued'";

const SQL_SET_FORCE_CUTOVER: &str = "UPDATE _vt.schema_migrations \
     SET force_cutover=1 \
     WHERE migration_uuid=:migration_uuid \
       AND migration_status IN ('queued','ready','running')";

const SQL_SET_CUTOVER_THRESHOLD: &str = "UPDATE _vt.schema_migrations \
     SET cutover_threshold_seconds=:seconds WHERE migration_uuid=:migration_uuid";

const SQL_SET_RETAIN_ARTIFACTS: &str = "UPDATE _vt.schema_migrations \
     SET retain_artifacts_seconds=:seconds WHERE migration_uuid=:migration_uuid";

const SQL_INCREMENT_CUTOVER_ATTEMPTS: &str = "UPDATE _vt.schema_migrations \
     SET cutover_attempts=cutover_attempts+1, last_cutover_attempt_timestamp=NOW(6) \
     WHERE migration_uuid=:migration_uuid";

const SQL_SET_ARTIFACTS: &str =
    "UPDATE _vt.schema_migrations SET artifacts=:artifacts WHERE migration_uuid=:migration_uuid";

const SQL_SET_SPECIAL_PLAN: &str = "UPDATE _vt.schema_migrations \
     SET special_plan=:special_plan WHERE migration_uuid=:migration_uuid";

const SQL_SET_SHADOW_ANALYZED: &str = "UPDATE _vt.schema_migrations \
     SET shadow_analyzed_timestamp=NOW(6) WHERE migration_uuid=:migration_uuid";

const SQL_SET_USER_THROTTLE_RATIO: &str = "UPDATE _vt.schema_migrations \
     SET user_throttle_ratio=:ratio WHERE migration_uuid=:migration_uuid";

const SQL_SET_TABLET: &str = "UPDATE _vt.schema_migrations \
     SET tablet=:tablet, liveness_timestamp=NOW(6) WHERE migration_uuid=:migration_uuid";

const SQL_SET_TABLET_FAILED: &str = "UPDATE _vt.schema_migrations \
     SET tablet_failure=1 WHERE migration_uuid=:migration_uuid";

const SQL_STAMP_CLEANUP: &str = "UPDATE _vt.schema_migrations \
     SET cleanup_timestamp=NOW(6) WHERE migration_uuid=:migration_uuid";

const SQL_FIX_COMPLETED_TIMESTAMPS: &str = "UPDATE _vt.schema_migrations \
     SET completed_timestamp=NOW(6) \
     WHERE migration_status IN ('complete','failed','cancelled') \
       AND completed_timestamp IS NULL";

/// `schema_migrations` over MySQL. Every statement references the sidecar
/// database through the `_vt.` qualifier, rewritten when the deployment
/// customizes the sidecar name.
pub struct MySqlMetadataStore {
    pool: Pool,
    sidecar_db: String,
}

impl MySqlMetadataStore {
    pub fn new(pool: Pool, sidecar_db: impl Into<String>) -> Self {
        MySqlMetadataStore {
            pool,
            sidecar_db: sidecar_db.into(),
        }
    }

    fn qualify(&self, sql: &str) -> String {
        if self.sidecar_db == "_vt" {
            sql.to_string()
        } else {
            sql.replace("_vt.", &format!("{}.", self.sidecar_db))
        }
    }

    async fn exec_params(&self, sql: &str, params: Params) -> Result<u64, DbError> {
        let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
        conn.exec_drop(self.qualify(sql), params)
            .await
            .map_err(to_db_error)?;
        Ok(conn.affected_rows())
    }

    async fn query_migrations(&self, sql: &str, params: Params) -> Result<Vec<Migration>, DbError> {
        let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
        let rows: Vec<MySqlRow> = conn
            .exec(self.qualify(sql), params)
            .await
            .map_err(to_db_error)?;
        rows.iter()
            .map(|row| Migration::from_row(&to_sql_row(row)).map_err(DbError::Other))
            .collect()
    }

    fn uuid_params(uuid: &OnlineDdlUuid) -> Params {
        params! { "migration_uuid" => uuid.as_str() }
    }
}

#[async_trait]
impl MetadataStore for MySqlMetadataStore {
    async fn init_schema(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
        let create_db = format!("CREATE DATABASE IF NOT EXISTS {}", self.sidecar_db);
        conn.query_drop(create_db).await.map_err(to_db_error)?;
        conn.query_drop(self.qualify(SQL_SCHEMA))
            .await
            .map_err(to_db_error)
    }

    async fn insert_migration(&self, migration: &Migration) -> Result<(), DbError> {
        self.exec_params(
            SQL_INSERT_MIGRATION,
            params! {
                "migration_uuid" => migration.uuid.as_str(),
                "keyspace" => &migration.keyspace,
                "shard" => &migration.shard,
                "mysql_schema" => &migration.mysql_schema,
                "mysql_table" => &migration.mysql_table,
                "migration_statement" => &migration.migration_statement,
                "strategy" => migration.strategy.strategy.as_str(),
                "options" => &migration.strategy.options,
                "ddl_action" => migration.ddl_action.as_str(),
                "is_view" => migration.is_view,
                "revert_uuid" => migration.revert_uuid.as_ref().map(|u| u.as_str()).unwrap_or(""),
                "migration_context" => &migration.migration_context,
                "migration_status" => migration.status.as_str(),
                "tablet" => &migration.tablet,
                "postpone_launch" => migration.postpone_launch,
                "postpone_completion" => migration.postpone_completion,
                "retain_artifacts_seconds" => migration.retain_artifacts_seconds,
                "cutover_threshold_seconds" => migration.cutover_threshold_seconds,
                "log_path" => &migration.log_path,
            },
        )
        .await?;
        Ok(())
    }

    async fn read_migration(&self, uuid: &OnlineDdlUuid) -> Result<Option<Migration>, DbError> {
        let mut migrations = self
            .query_migrations(SQL_SELECT_MIGRATION, Self::uuid_params(uuid))
            .await?;
        Ok(migrations.pop())
    }

    async fn pending_migrations(&self) -> Result<Vec<Migration>, DbError> {
        self.query_migrations(SQL_SELECT_PENDING, Params::Empty).await
    }

    async fn migrations_by_status(
        &self,
        status: MigrationStatus,
    ) -> Result<Vec<Migration>, DbError> {
        self.query_migrations(
            SQL_SELECT_BY_STATUS,
            params! { "migration_status" => status.as_str() },
        )
        .await
    }

    async fn unreviewed_migrations(&self) -> Result<Vec<Migration>, DbError> {
        self.query_migrations(SQL_SELECT_UNREVIEWED, Params::Empty)
            .await
    }

    async fn show_migrations(&self, filter: &MigrationFilter) -> Result<Vec<Migration>, DbError> {
        match filter {
            MigrationFilter::All => self.query_migrations(SQL_SELECT_ALL, Params::Empty).await,
            MigrationFilter::Recent => {
                self.query_migrations(SQL_SELECT_RECENT, Params::Empty).await
            }
            MigrationFilter::Status(status) => self.migrations_by_status(*status).await,
            MigrationFilter::Uuid(uuid) => self
                .query_migrations(SQL_SELECT_MIGRATION, Self::uuid_params(uuid))
                .await,
            MigrationFilter::Context(context) => {
                self.query_migrations(
                    SQL_SELECT_BY_CONTEXT,
                    params! { "migration_context" => context },
                )
                .await
            }
        }
    }

    async fn last_complete_on_table(&self, table: &str) -> Result<Option<Migration>, DbError> {
        let mut migrations = self
            .query_migrations(
                SQL_SELECT_LAST_COMPLETE_ON_TABLE,
                params! { "mysql_table" => table },
            )
            .await?;
        Ok(migrations.pop())
    }

    async fn terminal_failures_in_context(
        &self,
        context: &str,
    ) -> Result<Vec<Migration>, DbError> {
        self.query_migrations(
            SQL_SELECT_CONTEXT_FAILURES,
            params! { "migration_context" => context },
        )
        .await
    }

    async fn tablet_failure_migrations(
        &self,
        own_alias: &str,
    ) -> Result<Vec<Migration>, DbError> {
        self.query_migrations(SQL_SELECT_TABLET_FAILURES, params! { "tablet" => own_alias })
            .await
    }

    async fn artifact_cleanup_candidates(
        &self,
        default_retention_seconds: i64,
    ) -> Result<Vec<Migration>, DbError> {
        self.query_migrations(
            SQL_SELECT_CLEANUP_CANDIDATES,
            params! { "default_retention" => default_retention_seconds },
        )
        .await
    }

    async fn set_reviewed(
        &self,
        uuid: &OnlineDdlUuid,
        update: &ReviewUpdate,
    ) -> Result<(), DbError> {
        self.exec_params(
            SQL_SET_REVIEWED,
            params! {
                "migration_uuid" => uuid.as_str(),
                "ddl_action" => update.ddl_action.as_str(),
                "mysql_table" => &update.mysql_table,
                "is_view" => update.is_view,
                "is_immediate_operation" => update.is_immediate_operation,
            },
        )
        .await?;
        Ok(())
    }

    async fn mark_ready(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.exec_params(SQL_MARK_READY, Self::uuid_params(uuid)).await?;
        Ok(())
    }

    async fn mark_running(&self, uuid: &OnlineDdlUuid, tablet_alias: &str) -> Result<(), DbError> {
        self.exec_params(
            SQL_MARK_RUNNING,
            params! {
                "migration_uuid" => uuid.as_str(),
                "tablet" => tablet_alias,
            },
        )
        .await?;
        Ok(())
    }

    async fn mark_terminal(
        &self,
        uuid: &OnlineDdlUuid,
        status: MigrationStatus,
        message: &str,
    ) -> Result<(), DbError> {
        self.exec_params(
            SQL_MARK_TERMINAL,
            params! {
                "migration_uuid" => uuid.as_str(),
                "migration_status" => status.as_str(),
                "message" => message,
            },
        )
        .await?;
        Ok(())
    }

    async fn retry_migration(
        &self,
        uuid: &OnlineDdlUuid,
        tablet_alias: &str,
    ) -> Result<u64, DbError> {
        self.exec_params(
            SQL_RETRY_MIGRATION,
            params! {
                "migration_uuid" => uuid.as_str(),
                "tablet" => tablet_alias,
            },
        )
        .await
    }

    async fn update_message(&self, uuid: &OnlineDdlUuid, message: &str) -> Result<(), DbError> {
        self.exec_params(
            SQL_UPDATE_MESSAGE,
            params! { "migration_uuid" => uuid.as_str(), "message" => message },
        )
        .await?;
        Ok(())
    }

    async fn update_stage(&self, uuid: &OnlineDdlUuid, stage: &str) -> Result<(), DbError> {
        self.exec_params(
            SQL_UPDATE_STAGE,
            params! { "migration_uuid" => uuid.as_str(), "stage" => stage },
        )
        .await?;
        Ok(())
    }

    async fn touch_liveness(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.exec_params(SQL_TOUCH_LIVENESS, Self::uuid_params(uuid))
            .await?;
        Ok(())
    }

    async fn update_progress(
        &self,
        uuid: &OnlineDdlUuid,
        update: &ProgressUpdate,
    ) -> Result<(), DbError> {
        self.exec_params(
            SQL_UPDATE_PROGRESS,
            params! {
                "migration_uuid" => uuid.as_str(),
                "rows_copied" => update.rows_copied,
                "table_rows" => update.table_rows,
                "progress" => update.progress,
                "eta_seconds" => update.eta_seconds,
                "vreplication_lag_seconds" => update.vreplication_lag_seconds,
                "vitess_liveness_indicator" => update.vitess_liveness_indicator,
            },
        )
        .await?;
        Ok(())
    }

    async fn write_analysis(
        &self,
        uuid: &OnlineDdlUuid,
        update: &AnalysisUpdate,
    ) -> Result<(), DbError> {
        self.exec_params(
            SQL_WRITE_ANALYSIS,
            params! {
                "migration_uuid" => uuid.as_str(),
                "added_unique_keys" => update.added_unique_keys,
                "removed_unique_keys" => update.removed_unique_keys,
                "removed_unique_key_names" => &update.removed_unique_key_names,
                "removed_foreign_key_names" => &update.removed_foreign_key_names,
                "dropped_no_default_column_names" => &update.dropped_no_default_column_names,
                "expanded_column_names" => &update.expanded_column_names,
                "revertible_notes" => &update.revertible_notes,
            },
        )
        .await?;
        Ok(())
    }

    async fn set_ready_to_complete(
        &self,
        uuid: &OnlineDdlUuid,
        ready: bool,
    ) -> Result<(), DbError> {
        self.exec_params(
            SQL_SET_READY_TO_COMPLETE,
            params! { "migration_uuid" => uuid.as_str(), "ready" => ready },
        )
        .await?;
        Ok(())
    }

    async fn set_cancelled_timestamp(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.exec_params(SQL_SET_CANCELLED_TIMESTAMP, Self::uuid_params(uuid))
            .await?;
        Ok(())
    }

    async fn clear_postpone_completion(&self, uuid: &OnlineDdlUuid) -> Result<u64, DbError> {
        self.exec_params(SQL_CLEAR_POSTPONE_COMPLETION, Self::uuid_params(uuid))
            .await
    }

    async fn clear_postpone_launch(&self, uuid: &OnlineDdlUuid) -> Result<u64, DbError> {
        self.exec_params(SQL_CLEAR_POSTPONE_LAUNCH, Self::uuid_params(uuid))
            .await
    }

    async fn set_force_cutover(&self, uuid: &OnlineDdlUuid) -> Result<u64, DbError> {
        self.exec_params(SQL_SET_FORCE_CUTOVER, Self::uuid_params(uuid))
            .await
    }

    async fn set_cutover_threshold_seconds(
        &self,
        uuid: &OnlineDdlUuid,
        seconds: i64,
    ) -> Result<(), DbError> {
        self.exec_params(
            SQL_SET_CUTOVER_THRESHOLD,
            params! { "migration_uuid" => uuid.as_str(), "seconds" => seconds },
        )
        .await?;
        Ok(())
    }

    async fn set_retain_artifacts_seconds(
        &self,
        uuid: &OnlineDdlUuid,
        seconds: i64,
    ) -> Result<(), DbError> {
        self.exec_params(
            SQL_SET_RETAIN_ARTIFACTS,
            params! { "migration_uuid" => uuid.as_str(), "seconds" => seconds },
        )
        .await?;
        Ok(())
    }

    async fn increment_cutover_attempts(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.exec_params(SQL_INCREMENT_CUTOVER_ATTEMPTS, Self::uuid_params(uuid))
            .await?;
        Ok(())
    }

    async fn set_artifacts(&self, uuid: &OnlineDdlUuid, artifacts: &str) -> Result<(), DbError> {
        self.exec_params(
            SQL_SET_ARTIFACTS,
            params! { "migration_uuid" => uuid.as_str(), "artifacts" => artifacts },
        )
        .await?;
        Ok(())
    }

    async fn set_special_plan(&self, uuid: &OnlineDdlUuid, plan: &str) -> Result<(), DbError> {
        self.exec_params(
            SQL_SET_SPECIAL_PLAN,
            params! { "migration_uuid" => uuid.as_str(), "special_plan" => plan },
        )
        .await?;
        Ok(())
    }

    async fn set_shadow_analyzed(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.exec_params(SQL_SET_SHADOW_ANALYZED, Self::uuid_params(uuid))
            .await?;
        Ok(())
    }

    async fn set_user_throttle_ratio(
        &self,
        uuid: &OnlineDdlUuid,
        ratio: f64,
    ) -> Result<(), DbError> {
        self.exec_params(
            SQL_SET_USER_THROTTLE_RATIO,
            params! { "migration_uuid" => uuid.as_str(), "ratio" => ratio },
        )
        .await?;
        Ok(())
    }

    async fn set_tablet(&self, uuid: &OnlineDdlUuid, tablet_alias: &str) -> Result<(), DbError> {
        self.exec_params(
            SQL_SET_TABLET,
            params! { "migration_uuid" => uuid.as_str(), "tablet" => tablet_alias },
        )
        .await?;
        Ok(())
    }

    async fn set_tablet_failed(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.exec_params(SQL_SET_TABLET_FAILED, Self::uuid_params(uuid))
            .await?;
        Ok(())
    }

    async fn stamp_cleanup(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError> {
        self.exec_params(SQL_STAMP_CLEANUP, Self::uuid_params(uuid))
            .await?;
        Ok(())
    }

    async fn fix_completed_timestamps(&self) -> Result<u64, DbError> {
        self.exec_params(SQL_FIX_COMPLETED_TIMESTAMPS, Params::Empty)
            .await
    }
}
