use crate::error::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::row::SqlRow;
use std::time::Duration;

/// A dedicated MySQL connection. The cut-over engine holds up to three of
/// these (preparation, lock, rename) and treats each as single-writer.
#[async_trait]
pub trait DbaConn: Send {
    /// The server-side connection id, as seen in the process list.
    fn connection_id(&self) -> u64;

    async fn exec(&mut self, sql: &str) -> Result<(), DbError>;

    async fn query_rows(&mut self, sql: &str) -> Result<Vec<SqlRow>, DbError>;

    async fn set_lock_wait_timeout(&mut self, timeout: Duration) -> Result<(), DbError> {
        self.exec(&format!(
            "SET @@session.lock_wait_timeout = {}",
            timeout.as_secs().max(1)
        ))
        .await
    }
}

/// One entry of the server's process list.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub id: u64,
    pub user: String,
    pub command: String,
    pub state: String,
    pub time: i64,
    pub info: Option<String>,
}

/// The executor's window onto the local MySQL server: a pooled query surface,
/// dedicated connections, and the server facts the handlers need.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn exec(&self, sql: &str) -> Result<(), DbError>;

    async fn query_rows(&self, sql: &str) -> Result<Vec<SqlRow>, DbError>;

    /// A dedicated connection, released when dropped.
    async fn acquire(&self) -> Result<Box<dyn DbaConn>, DbError>;

    async fn table_exists(&self, table: &str) -> Result<bool, DbError>;

    /// The `SHOW CREATE TABLE` body (works for views as well).
    async fn show_create(&self, table: &str) -> Result<String, DbError>;

    /// Current primary position (`@@global.gtid_executed`).
    async fn primary_position(&self) -> Result<String, DbError>;

    async fn global_variable(&self, name: &str) -> Result<Option<String>, DbError>;

    async fn table_auto_increment(&self, table: &str) -> Result<Option<u64>, DbError>;

    async fn table_estimated_rows(&self, table: &str) -> Result<i64, DbError>;

    /// Count of foreign keys the table participates in, as child or parent.
    async fn foreign_key_participation(&self, table: &str) -> Result<u64, DbError>;

    async fn process_list(&self) -> Result<Vec<ProcessInfo>, DbError>;

    async fn kill_query(&self, connection_id: u64) -> Result<(), DbError>;

    async fn kill_connection(&self, connection_id: u64) -> Result<(), DbError>;

    /// Connection ids holding a data or metadata lock on the table. Empty on
    /// servers without performance_schema lock instrumentation.
    async fn lock_holders(&self, table: &str) -> Result<Vec<u64>, DbError>;
}

/// State of a vreplication stream as read from the workflow registry.
#[derive(Debug, Clone, Default)]
pub struct VReplStream {
    pub id: i64,
    pub workflow: String,
    pub source_table: String,
    pub target_table: String,
    pub pos: String,
    pub state: String,
    pub message: String,
    pub rows_copied: u64,
    /// Unix seconds of the last stream self-report.
    pub time_updated: i64,
    /// Unix seconds of the last applied transaction.
    pub transaction_timestamp: i64,
}

impl VReplStream {
    /// Replication lag derived from the last applied transaction.
    pub fn lag(&self, now: DateTime<Utc>) -> Duration {
        let lag = now.timestamp() - self.transaction_timestamp;
        Duration::from_secs(lag.max(0) as u64)
    }

    pub fn is_in_error(&self) -> bool {
        self.state.eq_ignore_ascii_case("Error") || !self.message.is_empty()
    }
}

/// Parameters for a new vreplication workflow.
#[derive(Debug, Clone)]
pub struct WorkflowSpec {
    /// Workflow name; always the migration uuid.
    pub workflow: String,
    pub source_table: String,
    pub target_table: String,
    /// When set, the stream starts from this binlog position instead of
    /// copying rows ("revert" mode).
    pub revert_binlog_pos: Option<String>,
}

/// The replication runtime, identified per-migration by workflow name.
#[async_trait]
pub trait VReplClient: Send + Sync {
    /// Registers the workflow and returns its stream id.
    async fn create_workflow(&self, spec: &WorkflowSpec) -> Result<i64, DbError>;

    async fn start_workflow(&self, workflow: &str) -> Result<(), DbError>;

    async fn stop_workflow(&self, workflow: &str, message: &str) -> Result<(), DbError>;

    async fn delete_workflow(&self, workflow: &str) -> Result<(), DbError>;

    async fn read_stream(&self, workflow: &str) -> Result<Option<VReplStream>, DbError>;

    /// Remaining copy-state rows; zero means row copy is complete.
    async fn copy_state_row_count(&self, stream_id: i64) -> Result<u64, DbError>;

    /// A terminal error recorded in the workflow log, if any.
    async fn terminal_log_error(&self, stream_id: i64) -> Result<Option<String>, DbError>;

    /// Blocks until the stream reaches `pos` or the timeout elapses.
    async fn wait_for_pos(
        &self,
        stream_id: i64,
        pos: &str,
        timeout: Duration,
    ) -> Result<(), DbError>;
}

/// Tablet-manager RPC surface consumed by the executor.
#[async_trait]
pub trait TabletManager: Send + Sync {
    async fn reload_schema(&self) -> Result<(), DbError>;

    async fn refresh_state(&self) -> Result<(), DbError>;

    /// Nudges the external table-GC component to scan for new GC tables.
    async fn request_gc_check(&self) -> Result<(), DbError>;
}

/// Lag-throttler control, app-scoped.
#[async_trait]
pub trait Throttler: Send + Sync {
    async fn throttle_app(
        &self,
        app: &str,
        ratio: f64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), DbError>;

    async fn unthrottle_app(&self, app: &str) -> Result<(), DbError>;

    /// Current throttle ratio for an app; 0.0 when unthrottled.
    async fn ratio_for(&self, app: &str) -> f64;
}

/// A held buffering window on one table's writes. Released explicitly on
/// every exit path; dropping without release is a leak that the
/// implementation logs.
#[async_trait]
pub trait BufferGuard: Send {
    async fn release(&mut self);
}

/// Query-rule subsystem: briefly buffers client writes to a table during
/// cut-over, and knows about in-flight prepared transactions.
#[async_trait]
pub trait QueryBuffer: Send + Sync {
    async fn buffer_writes(
        &self,
        table: &str,
        timeout: Duration,
    ) -> Result<Box<dyn BufferGuard>, DbError>;

    /// Identifiers of cross-shard prepared transactions touching the table.
    async fn prepared_transactions_for(&self, table: &str) -> Result<Vec<String>, DbError>;
}
