use executor_runtime::error::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("connector error: {0}")]
    Connector(#[from] connectors::error::ConnectorError),

    #[error("executor error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("shutdown requested")]
    ShutdownRequested,
}
