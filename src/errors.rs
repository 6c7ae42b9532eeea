use thiserror::Error;

use crate::similarity_search::ComputeError;

/// Error taxonomy for the recommendation cluster
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("User not found: {user_id}")]
    UserNotFound { user_id: String },

    #[error("Malformed task: {reason}")]
    MalformedTask { reason: String },

    #[error("Unknown task kind: {kind}")]
    UnknownTaskKind { kind: String },

    #[error("Peer {addr} unreachable: {message}")]
    Unreachable { addr: String, message: String, is_timeout: bool },

    #[error("Malformed response from {addr}: {reason}")]
    MalformedResponse { addr: String, reason: String },

    #[error("No results from workers ({configured} configured)")]
    NoWorkerResults { configured: usize },

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Message too large: {size} bytes (max {max_size} bytes)")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Codec error: {message}")]
    Codec { message: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("History store error: {message}")]
    History { message: String },

    #[error("Compute error: {0}")]
    Compute(#[from] ComputeError),
}

impl ClusterError {
    /// Create a caller-facing message for an outer API layer
    pub fn user_message(&self) -> String {
        match self {
            ClusterError::UserNotFound { user_id } => {
                format!("User '{}' was not found.", user_id)
            }
            ClusterError::MalformedTask { reason } => {
                format!("The request could not be processed: {}", reason)
            }
            ClusterError::UnknownTaskKind { kind } => {
                format!("The task kind '{}' is not supported.", kind)
            }
            ClusterError::NoWorkerResults { .. } => {
                "No results from workers. Please try again later.".to_string()
            }
            ClusterError::Unreachable { .. }
            | ClusterError::MalformedResponse { .. }
            | ClusterError::Timeout { .. }
            | ClusterError::Io { .. }
            | ClusterError::Codec { .. } => {
                "The recommendation cluster is unavailable. Please try again later.".to_string()
            }
            ClusterError::MessageTooLarge { max_size, .. } => {
                format!("The request is too large (max {} bytes).", max_size)
            }
            ClusterError::Config { message } => {
                format!("Configuration problem: {}", message)
            }
            ClusterError::Cache { .. } | ClusterError::History { .. } => {
                "A storage operation failed.".to_string()
            }
            ClusterError::Compute(e) => {
                format!("The request could not be processed: {}", e)
            }
        }
    }

    /// Whether the failure was caused by the caller's input rather than the cluster
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ClusterError::UserNotFound { .. }
                | ClusterError::MalformedTask { .. }
                | ClusterError::UnknownTaskKind { .. }
                | ClusterError::MessageTooLarge { .. }
                | ClusterError::Compute(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            ClusterError::Timeout { .. } => true,
            ClusterError::Unreachable { is_timeout, .. } => *is_timeout,
            _ => false,
        }
    }
}

impl From<std::io::Error> for ClusterError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::TimedOut => ClusterError::Timeout {
                operation: error.to_string(),
            },
            _ => ClusterError::Io {
                message: error.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(error: serde_json::Error) -> Self {
        ClusterError::Codec {
            message: error.to_string(),
        }
    }
}

/// Result type alias for cluster operations
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Log and discard the failure of an operation whose outcome must never reach the caller.
///
/// Cache writes and history appends go through here so the swallowing is
/// visible at each call site.
pub fn best_effort<T>(operation: &str, result: ClusterResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Ignoring failed {}: {}", operation, e);
            None
        }
    }
}
