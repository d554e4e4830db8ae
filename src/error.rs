use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;

use crate::executor::BatchResult;

#[derive(Debug, Error)]
pub enum SqlMapperError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Binding error: {0}")]
    BindingError(String),

    #[error("Parameter '{name}' not found. Available parameters are {available:?}")]
    ParameterNotFound { name: String, available: Vec<String> },

    #[error("Expected one result (or null) to be returned by selectOne(), but found: {0}")]
    TooManyResults(usize),

    #[error("Executor error: {0}")]
    ExecutorError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    /// Raised by a driver when one entry of a statement batch is rejected.
    #[error("Batch update failed after {} successful entries: {message}", update_counts.len())]
    BatchUpdateError {
        update_counts: Vec<i64>,
        message: String,
    },

    /// Raised by the batch executor; `successful` holds the sub-batches executed before
    /// `failed`.
    #[error("{message}")]
    BatchExecutorError {
        message: String,
        successful: Vec<BatchResult>,
        failed: Box<BatchResult>,
    },

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Incomplete cache reference: {0}")]
    IncompleteCacheRef(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl SqlMapperError {
    /// True for the family of errors raised while binding a call to a statement.
    #[must_use]
    pub fn is_binding_error(&self) -> bool {
        matches!(
            self,
            Self::BindingError(_) | Self::ParameterNotFound { .. } | Self::TooManyResults(_)
        )
    }
}

#[cfg(feature = "sqlite")]
impl From<bb8::RunError<rusqlite::Error>> for SqlMapperError {
    fn from(err: bb8::RunError<rusqlite::Error>) -> Self {
        SqlMapperError::ConnectionError(format!("SQLite pool error: {err}"))
    }
}
