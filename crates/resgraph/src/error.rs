//! Error types for batch-level failures and per-query execution failures.

/// Errors raised while preparing a batch.
///
/// Any of these aborts the whole batch. Failures local to a single query
/// once it is on the wire are reported as [`ExecutionError`] instead.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Build error for query {ref_id}: {reason}")]
    Build { ref_id: String, reason: String },

    #[error("Unsupported cloud: {0}")]
    UnsupportedCloud(String),

    #[error("Request construction error: {0}")]
    Construction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for batch-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed macro invocation found during interpolation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MacroError {
    #[error("macro {name} needs {expected}")]
    MissingArguments {
        name: &'static str,
        expected: &'static str,
    },

    #[error("unterminated macro call at byte {0}")]
    Unterminated(usize),
}

/// Failure of a single query after the batch was built.
///
/// The `Display` output is what the user sees; every variant renders a
/// non-empty message.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("request construction failed: {0}")]
    Construction(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("query cancelled")]
    Cancelled,

    #[error("query deadline exceeded")]
    DeadlineExceeded,

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("{message}")]
    Provider { status: u16, message: String },
}

impl ExecutionError {
    /// HTTP status of the provider response, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ExecutionError::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }
}
