//! Error types for the task queue
//!
//! Operation errors never reach the submitter directly: a worker renders them
//! into the job record's `error` field.

/// Failure of one operation invocation
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// No operation registered under the submitted name
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// Argument payload does not fit the operation's signature
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Operation exceeded its time budget
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// IO failure (for example spawning a subprocess)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation panicked or was aborted
    #[error("operation panicked: {0}")]
    Panicked(String),

    /// Operation-specific failure
    #[error("{0}")]
    Failed(String),
}

impl OperationError {
    /// Operation-specific failure with a message
    #[inline]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<serde_json::Error> for OperationError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidArguments(e.to_string())
    }
}

/// Task queue lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Workers did not stop within the shutdown timeout
    #[error("workers did not stop within {timeout_ms}ms ({pending} still running)")]
    ShutdownTimeout { timeout_ms: u64, pending: usize },

    /// Pool size of zero requested
    #[error("worker pool size must be at least 1")]
    EmptyPool,
}
