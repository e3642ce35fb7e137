use crate::error::to_db_error;
use crate::row::to_sql_row;
use async_trait::async_trait;
use executor_core::collab::DbaConn;
use executor_core::error::DbError;
use model::row::SqlRow;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Row as MySqlRow};

/// A dedicated pooled connection. Dropping it returns the connection to the
/// pool; the server-side session (including any held LOCK TABLES) ends with
/// it.
pub struct MySqlDbaConn {
    conn: Conn,
}

impl MySqlDbaConn {
    pub fn new(conn: Conn) -> Self {
        MySqlDbaConn { conn }
    }
}

#[async_trait]
impl DbaConn for MySqlDbaConn {
    fn connection_id(&self) -> u64 {
        u64::from(self.conn.id())
    }

    async fn exec(&mut self, sql: &str) -> Result<(), DbError> {
        self.conn.query_drop(sql).await.map_err(to_db_error)
    }

    async fn query_rows(&mut self, sql: &str) -> Result<Vec<SqlRow>, DbError> {
        let rows: Vec<MySqlRow> = self.conn.query(sql).await.map_err(to_db_error)?;
        Ok(rows.iter().map(to_sql_row).collect())
    }
}
