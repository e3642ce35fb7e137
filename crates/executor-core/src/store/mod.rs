use crate::error::DbError;
use async_trait::async_trait;
use model::migration::Migration;
use model::status::{DdlAction, MigrationStatus};
use model::uuid::OnlineDdlUuid;

/// Filter for `ShowMigrations`.
#[derive(Debug, Clone)]
pub enum MigrationFilter {
    All,
    Recent,
    Status(MigrationStatus),
    Uuid(OnlineDdlUuid),
    Context(String),
}

/// Fields the reviewer fills in on a queued row.
#[derive(Debug, Clone)]
pub struct ReviewUpdate {
    pub ddl_action: DdlAction,
    pub mysql_table: String,
    pub is_view: bool,
    pub is_immediate_operation: bool,
}

/// Progress fields maintained by the running-migration reviewer.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub rows_copied: u64,
    pub table_rows: i64,
    pub progress: f64,
    pub eta_seconds: i64,
    pub vreplication_lag_seconds: f64,
    pub vitess_liveness_indicator: i64,
}

/// Schema-analysis columns written after the shadow table is built.
#[derive(Debug, Clone, Default)]
pub struct AnalysisUpdate {
    pub added_unique_keys: u64,
    pub removed_unique_keys: u64,
    pub removed_unique_key_names: String,
    pub removed_foreign_key_names: String,
    pub dropped_no_default_column_names: String,
    pub expanded_column_names: String,
    pub revertible_notes: String,
}

/// The durable `schema_migrations` surface. Every executor decision reads
/// from and writes back through this trait; in-memory state is advisory.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Creates the backing table when missing.
    async fn init_schema(&self) -> Result<(), DbError>;

    async fn insert_migration(&self, migration: &Migration) -> Result<(), DbError>;

    async fn read_migration(&self, uuid: &OnlineDdlUuid) -> Result<Option<Migration>, DbError>;

    /// Non-terminal migrations, oldest first.
    async fn pending_migrations(&self) -> Result<Vec<Migration>, DbError>;

    async fn migrations_by_status(
        &self,
        status: MigrationStatus,
    ) -> Result<Vec<Migration>, DbError>;

    /// Queued rows the reviewer has not yet stamped.
    async fn unreviewed_migrations(&self) -> Result<Vec<Migration>, DbError>;

    async fn show_migrations(&self, filter: &MigrationFilter) -> Result<Vec<Migration>, DbError>;

    /// The most recently completed migration touching the table.
    async fn last_complete_on_table(&self, table: &str) -> Result<Option<Migration>, DbError>;

    /// Failed or cancelled migrations sharing the context.
    async fn terminal_failures_in_context(
        &self,
        context: &str,
    ) -> Result<Vec<Migration>, DbError>;

    /// Failed migrations carrying `tablet_failure` whose owner differs from
    /// `own_alias`; candidates for automatic retry after failover.
    async fn tablet_failure_migrations(
        &self,
        own_alias: &str,
    ) -> Result<Vec<Migration>, DbError>;

    /// Terminal migrations whose artifact-retention window has elapsed and
    /// whose cleanup has not run yet.
    async fn artifact_cleanup_candidates(
        &self,
        default_retention_seconds: i64,
    ) -> Result<Vec<Migration>, DbError>;

    async fn set_reviewed(&self, uuid: &OnlineDdlUuid, update: &ReviewUpdate)
        -> Result<(), DbError>;

    /// `queued -> ready`, stamping `ready_timestamp`.
    async fn mark_ready(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError>;

    /// `ready -> running`, stamping started/liveness and the owning tablet.
    async fn mark_running(
        &self,
        uuid: &OnlineDdlUuid,
        tablet_alias: &str,
    ) -> Result<(), DbError>;

    /// Terminal transition; `message` lands in the `message` column.
    async fn mark_terminal(
        &self,
        uuid: &OnlineDdlUuid,
        status: MigrationStatus,
        message: &str,
    ) -> Result<(), DbError>;

    /// Terminal -> queued; bumps `retries`, adopts the migration under
    /// `tablet_alias` and clears failure state. Returns affected row count.
    async fn retry_migration(
        &self,
        uuid: &OnlineDdlUuid,
        tablet_alias: &str,
    ) -> Result<u64, DbError>;

    async fn update_message(&self, uuid: &OnlineDdlUuid, message: &str) -> Result<(), DbError>;

    async fn update_stage(&self, uuid: &OnlineDdlUuid, stage: &str) -> Result<(), DbError>;

    async fn touch_liveness(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError>;

    async fn update_progress(
        &self,
        uuid: &OnlineDdlUuid,
        update: &ProgressUpdate,
    ) -> Result<(), DbError>;

    async fn write_analysis(
        &self,
        uuid: &OnlineDdlUuid,
        update: &AnalysisUpdate,
    ) -> Result<(), DbError>;

    /// Sets the instantaneous readiness flag; setting it also stamps the
    /// sticky `was_ready_to_complete` and `ready_to_complete_timestamp`
    /// (first time only).
    async fn set_ready_to_complete(
        &self,
        uuid: &OnlineDdlUuid,
        ready: bool,
    ) -> Result<(), DbError>;

    async fn set_cancelled_timestamp(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError>;

    async fn clear_postpone_completion(&self, uuid: &OnlineDdlUuid) -> Result<u64, DbError>;

    async fn clear_postpone_launch(&self, uuid: &OnlineDdlUuid) -> Result<u64, DbError>;

    async fn set_force_cutover(&self, uuid: &OnlineDdlUuid) -> Result<u64, DbError>;

    async fn set_cutover_threshold_seconds(
        &self,
        uuid: &OnlineDdlUuid,
        seconds: i64,
    ) -> Result<(), DbError>;

    async fn set_retain_artifacts_seconds(
        &self,
        uuid: &OnlineDdlUuid,
        seconds: i64,
    ) -> Result<(), DbError>;

    /// Bumps `cutover_attempts` and stamps `last_cutover_attempt_timestamp`.
    async fn increment_cutover_attempts(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError>;

    async fn set_artifacts(&self, uuid: &OnlineDdlUuid, artifacts: &str) -> Result<(), DbError>;

    async fn set_special_plan(&self, uuid: &OnlineDdlUuid, plan: &str) -> Result<(), DbError>;

    async fn set_shadow_analyzed(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError>;

    async fn set_user_throttle_ratio(
        &self,
        uuid: &OnlineDdlUuid,
        ratio: f64,
    ) -> Result<(), DbError>;

    /// Adopts the migration under a new owning tablet.
    async fn set_tablet(&self, uuid: &OnlineDdlUuid, tablet_alias: &str) -> Result<(), DbError>;

    async fn set_tablet_failed(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError>;

    async fn stamp_cleanup(&self, uuid: &OnlineDdlUuid) -> Result<(), DbError>;

    /// One-time fix-up assigning `completed_timestamp` to historical terminal
    /// rows that miss it. Returns affected row count.
    async fn fix_completed_timestamps(&self) -> Result<u64, DbError>;
}
