use crate::error::to_db_error;
use crate::row::to_sql_row;
use async_trait::async_trait;
use executor_core::collab::{VReplClient, VReplStream, WorkflowSpec};
use executor_core::error::DbError;
use mysql_async::prelude::Queryable;
use mysql_async::{Params, Pool, Row as MySqlRow, params};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

const SQL_VREPLICATION_SCHEMA: &str = include_str!("sql/vreplication.sql");
const SQL_COPY_STATE_SCHEMA: &str = include_str!("sql/copy_state.sql");
const SQL_VREPLICATION_LOG_SCHEMA: &str = include_str!("sql/vreplication_log.sql");

/// Marker written by the replication runtime when a stream error is beyond
/// retry.
const TERMINAL_ERROR_MARKER: &str = "terminal error";

const SQL_INSERT_WORKFLOW: &str = "INSERT INTO _vt.vreplication \
     (workflow, workflow_type, source_table, target_table, state, message, \
      time_updated, revert_binlog_pos) \
     VALUES (:workflow, 'OnlineDDL', :source_table, :target_table, 'Init', '', \
             UNIX_TIMESTAMP(), :revert_binlog_pos)";

const SQL_START_WORKFLOW: &str = "UPDATE _vt.vreplication \
     SET state='Running', message='', time_updated=UNIX_TIMESTAMP() WHERE workflow=:workflow";

const SQL_STOP_WORKFLOW: &str = "UPDATE _vt.vreplication \
     SET state='Stopped', message=:message, time_updated=UNIX_TIMESTAMP() \
     WHERE workflow=:workflow";

const SQL_DELETE_WORKFLOW: &str = "DELETE FROM _vt.vreplication WHERE workflow=:workflow";

const SQL_DELETE_COPY_STATE: &str = "DELETE cs FROM _vt.copy_state cs \
     JOIN _vt.vreplication vr ON cs.vrepl_id=vr.id WHERE vr.workflow=:workflow";

const SQL_DELETE_LOG: &str = "DELETE vl FROM _vt.vreplication_log vl \
     JOIN _vt.vreplication vr ON vl.vrepl_id=vr.id WHERE vr.workflow=:workflow";

const SQL_READ_STREAM: &str = "SELECT id, workflow, source_table, target_table, pos, state, \
            message, rows_copied, time_updated, transaction_timestamp \
     FROM _vt.vreplication WHERE workflow=:workflow";

const SQL_COPY_STATE_COUNT: &str =
    "SELECT COUNT(*) AS cnt FROM _vt.copy_state WHERE vrepl_id=:vrepl_id";

const SQL_TERMINAL_LOG_ERROR: &str = "SELECT message FROM _vt.vreplication_log \
     WHERE vrepl_id=:vrepl_id AND message LIKE :marker ORDER BY id DESC LIMIT 1";

/// How often `wait_for_pos` re-reads the stream position.
const POS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Workflow registry over the sidecar `vreplication` tables. The replication
/// runtime itself (row copy + binlog follow) is a separate component; this
/// client only manages and observes its registry rows.
pub struct SqlVReplClient {
    pool: Pool,
    sidecar_db: String,
}

impl SqlVReplClient {
    pub fn new(pool: Pool, sidecar_db: impl Into<String>) -> Self {
        SqlVReplClient {
            pool,
            sidecar_db: sidecar_db.into(),
        }
    }

    pub async fn init_schema(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
        for schema in [
            SQL_VREPLICATION_SCHEMA,
            SQL_COPY_STATE_SCHEMA,
            SQL_VREPLICATION_LOG_SCHEMA,
        ] {
            conn.query_drop(self.qualify(schema))
                .await
                .map_err(to_db_error)?;
        }
        Ok(())
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

    /// Lets the server decide whether `reached` covers `target`.
    async fn gtid_reached(&self, target: &str, reached: &str) -> Result<bool, DbError> {
        if reached.is_empty() {
            return Ok(false);
        }
        let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
        let subset: Option<(bool,)> = conn
            .exec_first("SELECT GTID_SUBSET(?, ?)", (target, reached))
            .await
            .map_err(to_db_error)?;
        Ok(subset.map(|s| s.0).unwrap_or(false))
    }
}

#[async_trait]
impl VReplClient for SqlVReplClient {
    async fn create_workflow(&self, spec: &WorkflowSpec) -> Result<i64, DbError> {
        let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
        conn.exec_drop(
            self.qualify(SQL_INSERT_WORKFLOW),
            params! {
                "workflow" => &spec.workflow,
                "source_table" => &spec.source_table,
                "target_table" => &spec.target_table,
                "revert_binlog_pos" => spec.revert_binlog_pos.as_deref().unwrap_or(""),
            },
        )
        .await
        .map_err(to_db_error)?;
        conn.last_insert_id()
            .map(|id| id as i64)
            .ok_or_else(|| DbError::Other("workflow insert produced no id".to_string()))
    }

    async fn start_workflow(&self, workflow: &str) -> Result<(), DbError> {
        self.exec_params(SQL_START_WORKFLOW, params! { "workflow" => workflow })
            .await?;
        Ok(())
    }

    async fn stop_workflow(&self, workflow: &str, message: &str) -> Result<(), DbError> {
        self.exec_params(
            SQL_STOP_WORKFLOW,
            params! { "workflow" => workflow, "message" => message },
        )
        .await?;
        Ok(())
    }

    async fn delete_workflow(&self, workflow: &str) -> Result<(), DbError> {
        // Children first; the registry row carries the join key.
        self.exec_params(SQL_DELETE_COPY_STATE, params! { "workflow" => workflow })
            .await?;
        self.exec_params(SQL_DELETE_LOG, params! { "workflow" => workflow })
            .await?;
        self.exec_params(SQL_DELETE_WORKFLOW, params! { "workflow" => workflow })
            .await?;
        Ok(())
    }

    async fn read_stream(&self, workflow: &str) -> Result<Option<VReplStream>, DbError> {
        let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
        let rows: Vec<MySqlRow> = conn
            .exec(self.qualify(SQL_READ_STREAM), params! { "workflow" => workflow })
            .await
            .map_err(to_db_error)?;
        Ok(rows.first().map(|row| {
            let row = to_sql_row(row);
            VReplStream {
                id: row.get_i64("id").unwrap_or(0),
                workflow: row.get_str("workflow").unwrap_or_default(),
                source_table: row.get_str("source_table").unwrap_or_default(),
                target_table: row.get_str("target_table").unwrap_or_default(),
                pos: row.get_str("pos").unwrap_or_default(),
                state: row.get_str("state").unwrap_or_default(),
                message: row.get_str("message").unwrap_or_default(),
                rows_copied: row.get_u64("rows_copied").unwrap_or(0),
                time_updated: row.get_i64("time_updated").unwrap_or(0),
                transaction_timestamp: row.get_i64("transaction_timestamp").unwrap_or(0),
            }
        }))
    }

    async fn copy_state_row_count(&self, stream_id: i64) -> Result<u64, DbError> {
        let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
        let count: Option<(u64,)> = conn
            .exec_first(
                self.qualify(SQL_COPY_STATE_COUNT),
                params! { "vrepl_id" => stream_id },
            )
            .await
            .map_err(to_db_error)?;
        Ok(count.map(|c| c.0).unwrap_or(0))
    }

    async fn terminal_log_error(&self, stream_id: i64) -> Result<Option<String>, DbError> {
        let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
        let message: Option<(String,)> = conn
            .exec_first(
                self.qualify(SQL_TERMINAL_LOG_ERROR),
                params! {
                    "vrepl_id" => stream_id,
                    "marker" => format!("%{TERMINAL_ERROR_MARKER}%"),
                },
            )
            .await
            .map_err(to_db_error)?;
        Ok(message.map(|m| m.0))
    }

    async fn wait_for_pos(
        &self,
        stream_id: i64,
        pos: &str,
        timeout: Duration,
    ) -> Result<(), DbError> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
            let stream_pos: Option<(String,)> = conn
                .exec_first(
                    self.qualify("SELECT pos FROM _vt.vreplication WHERE id=:id"),
                    params! { "id" => stream_id },
                )
                .await
                .map_err(to_db_error)?;
            drop(conn);
            let (stream_pos,) = stream_pos
                .ok_or_else(|| DbError::Other(format!("vreplication stream {stream_id} is gone")))?;
            if self.gtid_reached(pos, &stream_pos).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DbError::Timeout(format!(
                    "stream {stream_id} did not reach position within {timeout:?}"
                )));
            }
            debug!(stream_id, "waiting for vreplication position");
            sleep(POS_POLL_INTERVAL).await;
        }
    }
}
