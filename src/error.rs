use thiserror::Error;

use crate::results::ExecutionMetadata;

#[derive(Debug, Error)]
pub enum PgMiddlewareError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    /// A raw value did not satisfy the structural constraint of its type tag,
    /// or a result cell could not be decoded into the requested shape.
    #[error("Type mismatch for {tag}: {message}")]
    TypeMismatch { tag: String, message: String },

    #[error("Parameter count mismatch: template has {expected} placeholder(s), got {actual} parameter(s)")]
    ParameterCountMismatch { expected: usize, actual: usize },

    #[error("Query returned no rows")]
    NoRows,

    #[error("Timed out after {waited_ms} ms waiting for a pooled connection")]
    PoolTimeout { waited_ms: u128 },

    /// A batch stopped at `failed_index`; `completed` holds the results of the
    /// statements that ran before it, in batch order.
    #[error("Batch statement {failed_index} failed after {} completed: {source}", .completed.len())]
    BatchExecution {
        completed: Vec<ExecutionMetadata>,
        failed_index: usize,
        #[source]
        source: Box<PgMiddlewareError>,
    },

    #[error("Procedure {procedure} failed: {message}")]
    Procedure { procedure: String, message: String },

    #[error("Resource is closed: {0}")]
    ClosedResource(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl PgMiddlewareError {
    pub(crate) fn type_mismatch(tag: impl std::fmt::Display, message: impl Into<String>) -> Self {
        PgMiddlewareError::TypeMismatch {
            tag: tag.to_string(),
            message: message.into(),
        }
    }

    /// Message to surface when the failure came from the server.
    #[must_use]
    pub fn server_message(&self) -> String {
        match self {
            #[cfg(feature = "postgres")]
            PgMiddlewareError::PostgresError(err) => match err.as_db_error() {
                Some(db) => format!("{} ({})", db.message(), db.code().code()),
                None => err.to_string(),
            },
            PgMiddlewareError::ExecutionError(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
