use crate::uuid::OnlineDdlUuid;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// gRPC-style classification attached to every non-sentinel executor error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    FailedPrecondition,
    InvalidArgument,
    Unavailable,
    Aborted,
    NotFound,
    Unimplemented,
    Internal,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FailedPrecondition => "FAILED_PRECONDITION",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::Aborted => "ABORTED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Unimplemented => "UNIMPLEMENTED",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executor-facing errors: a small set of sentinel kinds callers can match
/// on, plus a classified wrapper for everything else.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutorError {
    #[error("executor is not running on a writable (primary) tablet")]
    NotWritableTablet,

    #[error("migration is already running: {0}")]
    MigrationAlreadyRunning(OnlineDdlUuid),

    #[error("migration not found: {0}")]
    MigrationNotFound(String),

    #[error("online DDL is disabled")]
    OnlineDdlDisabled,

    #[error("{code}: {message}")]
    Classified { code: ErrorCode, message: String },
}

impl ExecutorError {
    pub fn classified(code: ErrorCode, message: impl Into<String>) -> Self {
        ExecutorError::Classified {
            code,
            message: message.into(),
        }
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::classified(ErrorCode::FailedPrecondition, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::classified(ErrorCode::InvalidArgument, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::classified(ErrorCode::Unavailable, message)
    }

    /// The classification of this error, sentinels included.
    pub fn code(&self) -> ErrorCode {
        match self {
            ExecutorError::NotWritableTablet => ErrorCode::FailedPrecondition,
            ExecutorError::MigrationAlreadyRunning(_) => ErrorCode::FailedPrecondition,
            ExecutorError::MigrationNotFound(_) => ErrorCode::NotFound,
            ExecutorError::OnlineDdlDisabled => ErrorCode::Unavailable,
            ExecutorError::Classified { code, .. } => *code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_keep_their_codes() {
        assert_eq!(
            ExecutorError::NotWritableTablet.code(),
            ErrorCode::FailedPrecondition
        );
        assert_eq!(
            ExecutorError::OnlineDdlDisabled.code(),
            ErrorCode::Unavailable
        );
        assert_eq!(
            ExecutorError::MigrationNotFound("x".into()).code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn classified_errors_render_code_prefix() {
        let err = ExecutorError::failed_precondition("singleton migration rejected");
        assert_eq!(
            err.to_string(),
            "FAILED_PRECONDITION: singleton migration rejected"
        );
    }
}
