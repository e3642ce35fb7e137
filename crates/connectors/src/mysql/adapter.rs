use crate::error::{ConnectorError, escape_identifier, escape_string, to_db_error};
use crate::mysql::conn::MySqlDbaConn;
use crate::row::to_sql_row;
use async_trait::async_trait;
use executor_core::collab::{ConnectionPool, DbaConn, ProcessInfo};
use executor_core::error::DbError;
use model::row::SqlRow;
use mysql_async::prelude::Queryable;
use mysql_async::{Pool, Row as MySqlRow};
use tracing::debug;

const SQL_PROCESS_LIST: &str =
    "SELECT ID, USER, COMMAND, TIME, STATE, INFO FROM information_schema.PROCESSLIST";

const SQL_TABLE_AUTO_INCREMENT: &str = "SELECT AUTO_INCREMENT FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA=DATABASE() AND TABLE_NAME=?";

const SQL_TABLE_ESTIMATED_ROWS: &str = "SELECT TABLE_ROWS FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA=DATABASE() AND TABLE_NAME=?";

const SQL_FOREIGN_KEY_PARTICIPATION: &str =
    "SELECT COUNT(*) FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE \
     WHERE REFERENCED_TABLE_NAME IS NOT NULL \
       AND TABLE_SCHEMA=DATABASE() \
       AND (TABLE_NAME=? OR REFERENCED_TABLE_NAME=?)";

// Lock instrumentation is only available on MySQL >= 8.0 with
// performance_schema enabled; both queries degrade to an empty result.
const SQL_DATA_LOCK_HOLDERS: &str = "SELECT DISTINCT t.PROCESSLIST_ID AS processlist_id \
     FROM performance_schema.data_locks dl \
     JOIN performance_schema.threads t ON dl.THREAD_ID = t.THREAD_ID \
     WHERE dl.OBJECT_NAME=? AND t.PROCESSLIST_ID IS NOT NULL";

const SQL_METADATA_LOCK_HOLDERS: &str = "SELECT DISTINCT t.PROCESSLIST_ID AS processlist_id \
     FROM performance_schema.metadata_locks ml \
     JOIN performance_schema.threads t ON ml.OWNER_THREAD_ID = t.THREAD_ID \
     WHERE ml.OBJECT_TYPE='TABLE' AND ml.OBJECT_NAME=? AND t.PROCESSLIST_ID IS NOT NULL";

/// The executor's window onto the local MySQL server, backed by a
/// `mysql_async` pool.
#[derive(Clone)]
pub struct MySqlConnectionPool {
    pool: Pool,
}

impl MySqlConnectionPool {
    pub fn connect(url: &str) -> Result<Self, ConnectorError> {
        let pool = Pool::from_url(url)?;
        Ok(MySqlConnectionPool { pool })
    }

    pub fn from_pool(pool: Pool) -> Self {
        MySqlConnectionPool { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn query_first_u64(&self, sql: &str, param: &str) -> Result<Option<u64>, DbError> {
        let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
        let row: Option<(Option<u64>,)> = conn
            .exec_first(sql, (param,))
            .await
            .map_err(to_db_error)?;
        Ok(row.and_then(|r| r.0))
    }
}

#[async_trait]
impl ConnectionPool for MySqlConnectionPool {
    async fn exec(&self, sql: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
        conn.query_drop(sql).await.map_err(to_db_error)
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<SqlRow>, DbError> {
        let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
        let rows: Vec<MySqlRow> = conn.query(sql).await.map_err(to_db_error)?;
        Ok(rows.iter().map(to_sql_row).collect())
    }

    async fn acquire(&self) -> Result<Box<dyn DbaConn>, DbError> {
        let conn = self.pool.get_conn().await.map_err(to_db_error)?;
        Ok(Box::new(MySqlDbaConn::new(conn)))
    }

    async fn table_exists(&self, table: &str) -> Result<bool, DbError> {
        let sql = format!("SHOW TABLES LIKE '{}'", escape_string(table));
        let rows = self.query_rows(&sql).await?;
        Ok(!rows.is_empty())
    }

    async fn show_create(&self, table: &str) -> Result<String, DbError> {
        let sql = format!("SHOW CREATE TABLE `{}`", escape_identifier(table));
        let rows = self.query_rows(&sql).await?;
        // Column 1 holds the statement for both tables ("Create Table") and
        // views ("Create View").
        rows.first()
            .and_then(|row| row.at(1))
            .and_then(|value| value.as_str())
            .map(String::from)
            .ok_or_else(|| DbError::Other(format!("no create statement for table {table}")))
    }

    async fn primary_position(&self) -> Result<String, DbError> {
        let rows = self.query_rows("SELECT @@global.gtid_executed").await?;
        rows.first()
            .and_then(|row| row.at(0))
            .and_then(|value| value.as_str())
            .map(|s| s.replace('\n', ""))
            .ok_or_else(|| DbError::Other("cannot read gtid_executed".to_string()))
    }

    async fn global_variable(&self, name: &str) -> Result<Option<String>, DbError> {
        let sql = format!("SHOW GLOBAL VARIABLES LIKE '{}'", escape_string(name));
        let rows = self.query_rows(&sql).await?;
        Ok(rows
            .first()
            .and_then(|row| row.at(1))
            .and_then(|value| value.as_str())
            .map(String::from))
    }

    async fn table_auto_increment(&self, table: &str) -> Result<Option<u64>, DbError> {
        self.query_first_u64(SQL_TABLE_AUTO_INCREMENT, table).await
    }

    async fn table_estimated_rows(&self, table: &str) -> Result<i64, DbError> {
        Ok(self
            .query_first_u64(SQL_TABLE_ESTIMATED_ROWS, table)
            .await?
            .map(|v| v as i64)
            .unwrap_or(0))
    }

    async fn foreign_key_participation(&self, table: &str) -> Result<u64, DbError> {
        let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
        let count: Option<(u64,)> = conn
            .exec_first(SQL_FOREIGN_KEY_PARTICIPATION, (table, table))
            .await
            .map_err(to_db_error)?;
        Ok(count.map(|c| c.0).unwrap_or(0))
    }

    async fn process_list(&self) -> Result<Vec<ProcessInfo>, DbError> {
        let rows = self.query_rows(SQL_PROCESS_LIST).await?;
        Ok(rows
            .iter()
            .map(|row| ProcessInfo {
                id: row.get_u64("ID").unwrap_or(0),
                user: row.get_str("USER").unwrap_or_default(),
                command: row.get_str("COMMAND").unwrap_or_default(),
                state: row.get_str("STATE").unwrap_or_default(),
                time: row.get_i64("TIME").unwrap_or(0),
                info: row.get_str("INFO"),
            })
            .collect())
    }

    async fn kill_query(&self, connection_id: u64) -> Result<(), DbError> {
        self.exec(&format!("KILL QUERY {connection_id}")).await
    }

    async fn kill_connection(&self, connection_id: u64) -> Result<(), DbError> {
        self.exec(&format!("KILL {connection_id}")).await
    }

    async fn lock_holders(&self, table: &str) -> Result<Vec<u64>, DbError> {
        let mut holders = Vec::new();
        for sql in [SQL_DATA_LOCK_HOLDERS, SQL_METADATA_LOCK_HOLDERS] {
            let mut conn = self.pool.get_conn().await.map_err(to_db_error)?;
            match conn.exec::<MySqlRow, _, _>(sql, (table,)).await {
                Ok(rows) => {
                    for row in &rows {
                        if let Some(id) = to_sql_row(row).get_u64("processlist_id") {
                            if !holders.contains(&id) {
                                holders.push(id);
                            }
                        }
                    }
                }
                Err(err) => {
                    debug!(error = %err, "lock instrumentation unavailable");
                    return Ok(Vec::new());
                }
            }
        }
        Ok(holders)
    }
}
