use executor_core::error::DbError;
use thiserror::Error;

/// Errors happening during connector setup.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The MySQL driver failed to build the connection pool.
    #[error("MySQL connector creation failed: {0}")]
    MySql(#[from] mysql_async::Error),

    /// An invalid database URL was provided.
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
}

/// Maps driver errors onto the seam-crossing error type, preserving server
/// error codes so the executor can classify them.
pub fn to_db_error(err: mysql_async::Error) -> DbError {
    match err {
        mysql_async::Error::Server(server_err) => DbError::Server {
            code: server_err.code,
            message: server_err.message,
        },
        other => DbError::Connection(other.to_string()),
    }
}

/// Escapes a string literal for inline use in a statement.
pub fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Escapes an identifier for backtick quoting.
pub fn escape_identifier(name: &str) -> String {
    name.replace('`', "``")
}
