//! Error types for the conversation core.

use jarvis_core::error::JarvisError;

/// Errors from the conversation core.
///
/// Only `EngineUnavailable`, the input validation errors and
/// `SessionNotFound` reach callers as `Err`; engine failures and artifact
/// failures are recovered into visible assistant turns.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("reasoning engine is not available")]
    EngineUnavailable,
    #[error("reasoning engine call failed: {0}")]
    EngineCallFailed(String),
    #[error("reasoning engine timed out after {0} seconds")]
    EngineTimeout(u64),
    #[error("request was cancelled")]
    Cancelled,
    #[error("{kind} rendering failed: {reason}")]
    ArtifactParseFailed { kind: String, reason: String },
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<JarvisError> for ChatError {
    fn from(err: JarvisError) -> Self {
        match err {
            JarvisError::NotFound(id) => ChatError::SessionNotFound(id),
            other => ChatError::StorageError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::EngineCallFailed(err.to_string())
    }
}
