use ddl_syntax::error::SyntaxError;
use executor_core::error::DbError;
use model::error::ExecutorError;
use thiserror::Error;

/// Top-level errors of the online DDL executor.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("statement error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Internal(String),
}

impl RuntimeError {
    /// Transient errors leave the migration running; the next tick retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, RuntimeError::Db(db_err) if db_err.is_transient())
    }
}
