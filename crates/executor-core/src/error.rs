use thiserror::Error;

// MySQL server error codes the executor reacts to.
pub const ER_CANT_FIND_FILE: u16 = 1017;
pub const ER_TOO_LONG_IDENT: u16 = 1059;
pub const ER_NO_SUCH_THREAD: u16 = 1094;
pub const ER_NO_SUCH_TABLE: u16 = 1146;
pub const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
pub const ER_LOCK_DEADLOCK: u16 = 1213;

/// Database-layer errors crossing the collaborator seams. Server errors keep
/// their MySQL code so callers can classify them (acceptable vs transient vs
/// terminal) on either side of the trait boundary.
#[derive(Debug, Clone, Error)]
pub enum DbError {
    #[error("mysql error {code}: {message}")]
    Server { code: u16, message: String },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("{0}")]
    Other(String),
}

impl DbError {
    pub fn server(code: u16, message: impl Into<String>) -> Self {
        DbError::Server {
            code,
            message: message.into(),
        }
    }

    pub fn server_code(&self) -> Option<u16> {
        match self {
            DbError::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// DROP/RENAME of a table that is already gone.
    pub fn is_missing_table(&self) -> bool {
        matches!(
            self.server_code(),
            Some(ER_NO_SUCH_TABLE) | Some(ER_CANT_FIND_FILE)
        )
    }

    pub fn is_too_long_identifier(&self) -> bool {
        self.server_code() == Some(ER_TOO_LONG_IDENT)
    }

    /// Lock-wait and deadlock errors retry on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.server_code(),
            Some(ER_LOCK_WAIT_TIMEOUT) | Some(ER_LOCK_DEADLOCK)
        ) || matches!(self, DbError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_server_codes() {
        assert!(DbError::server(ER_NO_SUCH_TABLE, "no such table").is_missing_table());
        assert!(DbError::server(ER_CANT_FIND_FILE, "cannot find file").is_missing_table());
        assert!(DbError::server(ER_LOCK_WAIT_TIMEOUT, "lock wait").is_transient());
        assert!(DbError::Timeout("pos wait".into()).is_transient());
        assert!(!DbError::Other("boom".into()).is_missing_table());
        assert!(DbError::server(ER_TOO_LONG_IDENT, "ident").is_too_long_identifier());
    }
}
