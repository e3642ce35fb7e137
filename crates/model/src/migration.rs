use crate::row::SqlRow;
use crate::status::{DdlAction, MigrationStatus};
use crate::strategy::{DdlStrategy, DdlStrategySetting};
use crate::uuid::OnlineDdlUuid;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Separator of the `artifacts` column list.
pub const ARTIFACT_SEPARATOR: &str = ",";

/// One `schema_migrations` row, mapped once from a generic result row into a
/// typed record. The metadata store is the source of truth; instances of this
/// struct are snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Migration {
    pub uuid: OnlineDdlUuid,
    pub keyspace: String,
    pub shard: String,
    pub mysql_schema: String,
    pub mysql_table: String,
    pub migration_statement: String,
    pub strategy: DdlStrategySetting,
    pub ddl_action: DdlAction,
    pub is_view: bool,
    pub revert_uuid: Option<OnlineDdlUuid>,
    pub migration_context: String,
    pub status: MigrationStatus,
    /// Alias of the executor that last owned this migration.
    pub tablet: String,
    pub tablet_failed: bool,
    pub retries: u64,

    pub requested_timestamp: Option<DateTime<Utc>>,
    pub reviewed_timestamp: Option<DateTime<Utc>>,
    pub ready_timestamp: Option<DateTime<Utc>>,
    pub started_timestamp: Option<DateTime<Utc>>,
    pub liveness_timestamp: Option<DateTime<Utc>>,
    pub completed_timestamp: Option<DateTime<Utc>>,
    pub cleanup_timestamp: Option<DateTime<Utc>>,
    pub cancelled_timestamp: Option<DateTime<Utc>>,
    pub last_cutover_attempt_timestamp: Option<DateTime<Utc>>,
    pub ready_to_complete_timestamp: Option<DateTime<Utc>>,
    pub shadow_analyzed_timestamp: Option<DateTime<Utc>>,

    pub cutover_attempts: u64,
    pub rows_copied: u64,
    pub table_rows: i64,
    pub progress: f64,
    pub eta_seconds: i64,
    pub vreplication_lag_seconds: f64,

    pub postpone_launch: bool,
    pub postpone_completion: bool,
    pub ready_to_complete: bool,
    /// Sticky: set once the migration first becomes ready to complete,
    /// never cleared.
    pub was_ready_to_complete: bool,
    pub force_cutover: bool,
    pub is_immediate_operation: bool,

    /// Comma-separated auxiliary tables owned by this migration.
    pub artifacts: String,
    pub retain_artifacts_seconds: i64,
    pub cutover_threshold_seconds: i64,
    pub special_plan: String,
    pub user_throttle_ratio: f64,
    pub vitess_liveness_indicator: i64,
    pub log_path: String,
    pub message: String,
    pub stage: String,

    pub added_unique_keys: u64,
    pub removed_unique_keys: u64,
    pub removed_unique_key_names: String,
    pub removed_foreign_key_names: String,
    pub dropped_no_default_column_names: String,
    pub expanded_column_names: String,
    pub revertible_notes: String,
}

impl Migration {
    /// A blank queued migration, as inserted by Submit.
    pub fn new_queued(
        uuid: OnlineDdlUuid,
        keyspace: impl Into<String>,
        shard: impl Into<String>,
        mysql_schema: impl Into<String>,
        mysql_table: impl Into<String>,
        migration_statement: impl Into<String>,
        strategy: DdlStrategySetting,
        ddl_action: DdlAction,
        migration_context: impl Into<String>,
    ) -> Self {
        Migration {
            uuid,
            keyspace: keyspace.into(),
            shard: shard.into(),
            mysql_schema: mysql_schema.into(),
            mysql_table: mysql_table.into(),
            migration_statement: migration_statement.into(),
            strategy,
            ddl_action,
            is_view: false,
            revert_uuid: None,
            migration_context: migration_context.into(),
            status: MigrationStatus::Queued,
            tablet: String::new(),
            tablet_failed: false,
            retries: 0,
            requested_timestamp: Some(Utc::now()),
            reviewed_timestamp: None,
            ready_timestamp: None,
            started_timestamp: None,
            liveness_timestamp: None,
            completed_timestamp: None,
            cleanup_timestamp: None,
            cancelled_timestamp: None,
            last_cutover_attempt_timestamp: None,
            ready_to_complete_timestamp: None,
            shadow_analyzed_timestamp: None,
            cutover_attempts: 0,
            rows_copied: 0,
            table_rows: 0,
            progress: 0.0,
            eta_seconds: -1,
            vreplication_lag_seconds: 0.0,
            postpone_launch: false,
            postpone_completion: false,
            ready_to_complete: false,
            was_ready_to_complete: false,
            force_cutover: false,
            is_immediate_operation: false,
            artifacts: String::new(),
            retain_artifacts_seconds: 0,
            cutover_threshold_seconds: 0,
            special_plan: String::new(),
            user_throttle_ratio: 0.0,
            vitess_liveness_indicator: 0,
            log_path: String::new(),
            message: String::new(),
            stage: String::new(),
            added_unique_keys: 0,
            removed_unique_keys: 0,
            removed_unique_key_names: String::new(),
            removed_foreign_key_names: String::new(),
            dropped_no_default_column_names: String::new(),
            expanded_column_names: String::new(),
            revertible_notes: String::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    pub fn runs_vreplication(&self) -> bool {
        self.strategy.strategy.runs_vreplication()
    }

    /// The artifact tables this migration owns, newest first.
    pub fn artifact_tables(&self) -> Vec<String> {
        self.artifacts
            .split(ARTIFACT_SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    /// Prepends an artifact to the list so the newest artifact is renamed
    /// first during garbage collection.
    pub fn prepend_artifact(&mut self, artifact: &str) {
        if self.artifacts.is_empty() {
            self.artifacts = artifact.to_string();
        } else {
            self.artifacts = format!("{artifact}{ARTIFACT_SEPARATOR}{}", self.artifacts);
        }
    }

    pub fn remove_artifact(&mut self, artifact: &str) {
        self.artifacts = self
            .artifact_tables()
            .into_iter()
            .filter(|a| a != artifact)
            .collect::<Vec<_>>()
            .join(ARTIFACT_SEPARATOR);
    }

    /// The per-migration cut-over threshold, or the supplied default when the
    /// column holds zero.
    pub fn cut_over_threshold_or(&self, default: Duration) -> Duration {
        if self.cutover_threshold_seconds > 0 {
            Duration::from_secs(self.cutover_threshold_seconds as u64)
        } else {
            default
        }
    }

    pub fn force_cut_over_after(&self) -> Option<Duration> {
        self.strategy.force_cut_over_after().ok().flatten()
    }

    /// Maps a metadata-store row into the typed record.
    pub fn from_row(row: &SqlRow) -> Result<Migration, String> {
        let uuid = OnlineDdlUuid::parse(
            &row.get_str("migration_uuid")
                .ok_or("missing migration_uuid")?,
        )?;
        let strategy = DdlStrategySetting::new(
            DdlStrategy::from_str(&row.get_str("strategy").unwrap_or_default())?,
            row.get_str("options").unwrap_or_default(),
        );
        let ddl_action = DdlAction::from_str(&row.get_str("ddl_action").unwrap_or_default())?;
        let status =
            MigrationStatus::from_str(&row.get_str("migration_status").unwrap_or_default())?;
        let revert_uuid = match row.get_str("revert_uuid") {
            Some(s) if !s.is_empty() => Some(OnlineDdlUuid::parse(&s)?),
            _ => None,
        };

        Ok(Migration {
            uuid,
            keyspace: row.get_str("keyspace").unwrap_or_default(),
            shard: row.get_str("shard").unwrap_or_default(),
            mysql_schema: row.get_str("mysql_schema").unwrap_or_default(),
            mysql_table: row.get_str("mysql_table").unwrap_or_default(),
            migration_statement: row.get_str("migration_statement").unwrap_or_default(),
            strategy,
            ddl_action,
            is_view: row.get_bool("is_view").unwrap_or(false),
            revert_uuid,
            migration_context: row.get_str("migration_context").unwrap_or_default(),
            status,
            tablet: row.get_str("tablet").unwrap_or_default(),
            tablet_failed: row.get_bool("tablet_failure").unwrap_or(false),
            retries: row.get_u64("retries").unwrap_or(0),
            requested_timestamp: parse_timestamp(row, "requested_timestamp"),
            reviewed_timestamp: parse_timestamp(row, "reviewed_timestamp"),
            ready_timestamp: parse_timestamp(row, "ready_timestamp"),
            started_timestamp: parse_timestamp(row, "started_timestamp"),
            liveness_timestamp: parse_timestamp(row, "liveness_timestamp"),
            completed_timestamp: parse_timestamp(row, "completed_timestamp"),
            cleanup_timestamp: parse_timestamp(row, "cleanup_timestamp"),
            cancelled_timestamp: parse_timestamp(row, "cancelled_timestamp"),
            last_cutover_attempt_timestamp: parse_timestamp(row, "last_cutover_attempt_timestamp"),
            ready_to_complete_timestamp: parse_timestamp(row, "ready_to_complete_timestamp"),
            shadow_analyzed_timestamp: parse_timestamp(row, "shadow_analyzed_timestamp"),
            cutover_attempts: row.get_u64("cutover_attempts").unwrap_or(0),
            rows_copied: row.get_u64("rows_copied").unwrap_or(0),
            table_rows: row.get_i64("table_rows").unwrap_or(0),
            progress: row.get_f64("progress").unwrap_or(0.0),
            eta_seconds: row.get_i64("eta_seconds").unwrap_or(-1),
            vreplication_lag_seconds: row.get_f64("vreplication_lag_seconds").unwrap_or(0.0),
            postpone_launch: row.get_bool("postpone_launch").unwrap_or(false),
            postpone_completion: row.get_bool("postpone_completion").unwrap_or(false),
            ready_to_complete: row.get_bool("ready_to_complete").unwrap_or(false),
            was_ready_to_complete: row.get_bool("was_ready_to_complete").unwrap_or(false),
            force_cutover: row.get_bool("force_cutover").unwrap_or(false),
            is_immediate_operation: row.get_bool("is_immediate_operation").unwrap_or(false),
            artifacts: row.get_str("artifacts").unwrap_or_default(),
            retain_artifacts_seconds: row.get_i64("retain_artifacts_seconds").unwrap_or(0),
            cutover_threshold_seconds: row.get_i64("cutover_threshold_seconds").unwrap_or(0),
            special_plan: row.get_str("special_plan").unwrap_or_default(),
            user_throttle_ratio: row.get_f64("user_throttle_ratio").unwrap_or(0.0),
            vitess_liveness_indicator: row.get_i64("vitess_liveness_indicator").unwrap_or(0),
            log_path: row.get_str("log_path").unwrap_or_default(),
            message: row.get_str("message").unwrap_or_default(),
            stage: row.get_str("stage").unwrap_or_default(),
            added_unique_keys: row.get_u64("added_unique_keys").unwrap_or(0),
            removed_unique_keys: row.get_u64("removed_unique_keys").unwrap_or(0),
            removed_unique_key_names: row.get_str("removed_unique_key_names").unwrap_or_default(),
            removed_foreign_key_names: row.get_str("removed_foreign_key_names").unwrap_or_default(),
            dropped_no_default_column_names: row
                .get_str("dropped_no_default_column_names")
                .unwrap_or_default(),
            expanded_column_names: row.get_str("expanded_column_names").unwrap_or_default(),
            revertible_notes: row.get_str("revertible_notes").unwrap_or_default(),
        })
    }
}

/// Timestamps arrive either in MySQL's `%Y-%m-%d %H:%M:%S[.f]` text form or
/// as NULL.
fn parse_timestamp(row: &SqlRow, column: &str) -> Option<DateTime<Utc>> {
    let text = row.get_str(column)?;
    if text.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::SqlValue;

    fn minimal_row(uuid: &OnlineDdlUuid) -> SqlRow {
        let mut row = SqlRow::default();
        row.push("migration_uuid", SqlValue::from(uuid.as_str()));
        row.push("strategy", SqlValue::from("vitess"));
        row.push("options", SqlValue::from("--postpone-completion"));
        row.push("ddl_action", SqlValue::from("alter"));
        row.push("migration_status", SqlValue::from("running"));
        row.push("mysql_table", SqlValue::from("customers"));
        row.push(
            "requested_timestamp",
            SqlValue::from("2026-03-01 10:00:00.000000"),
        );
        row.push("retries", SqlValue::UInt(1));
        row.push("postpone_completion", SqlValue::Int(1));
        row
    }

    #[test]
    fn maps_row_into_typed_record() {
        let uuid = OnlineDdlUuid::generate();
        let migration = Migration::from_row(&minimal_row(&uuid)).unwrap();
        assert_eq!(migration.uuid, uuid);
        assert_eq!(migration.status, MigrationStatus::Running);
        assert_eq!(migration.mysql_table, "customers");
        assert!(migration.strategy.is_postpone_completion());
        assert!(migration.postpone_completion);
        assert!(migration.requested_timestamp.is_some());
        assert!(migration.completed_timestamp.is_none());
    }

    #[test]
    fn artifact_list_manipulation() {
        let uuid = OnlineDdlUuid::generate();
        let mut migration = Migration::new_queued(
            uuid,
            "commerce",
            "0",
            "vt_commerce",
            "customers",
            "ALTER TABLE customers ADD COLUMN note TEXT",
            DdlStrategySetting::direct(),
            DdlAction::Alter,
            "ctx",
        );
        migration.prepend_artifact("_vt_HOLD_a_1");
        migration.prepend_artifact("_vt_HOLD_b_2");
        assert_eq!(migration.artifact_tables(), vec!["_vt_HOLD_b_2", "_vt_HOLD_a_1"]);
        migration.remove_artifact("_vt_HOLD_b_2");
        assert_eq!(migration.artifact_tables(), vec!["_vt_HOLD_a_1"]);
        migration.remove_artifact("_vt_HOLD_a_1");
        assert!(migration.artifact_tables().is_empty());
    }

    #[test]
    fn threshold_defaulting() {
        let uuid = OnlineDdlUuid::generate();
        let mut migration = Migration::new_queued(
            uuid,
            "commerce",
            "0",
            "vt_commerce",
            "t",
            "ALTER TABLE t ENGINE=InnoDB",
            DdlStrategySetting::direct(),
            DdlAction::Alter,
            "",
        );
        assert_eq!(
            migration.cut_over_threshold_or(Duration::from_secs(10)),
            Duration::from_secs(10)
        );
        migration.cutover_threshold_seconds = 15;
        assert_eq!(
            migration.cut_over_threshold_or(Duration::from_secs(10)),
            Duration::from_secs(15)
        );
    }
}
