use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyntaxError {
    #[error("unsupported statement: {0}")]
    Unsupported(String),

    #[error("malformed statement: {0}")]
    Malformed(String),

    #[error("invalid submission directive: {0}")]
    Directive(String),

    #[error("sql parse error: {0}")]
    Parse(#[from] sqlparser::parser::ParserError),
}
