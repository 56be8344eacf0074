use thiserror::Error;

pub type ReadDbResult<T> = Result<T, ReadDbError>;

#[derive(Debug, Error)]
pub enum ReadDbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialisation error: {0}")]
    Serialisation(String),

    #[error("Read transaction already released")]
    Closed,

    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown node type: {0}")]
pub struct UnknownNodeType(pub String);
