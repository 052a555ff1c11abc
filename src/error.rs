//! Muninn error types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::limiter::RateLimitInfo;

/// Muninn error types
#[derive(Debug, thiserror::Error)]
pub enum MuninnError {
    // Caller errors
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        info: RateLimitInfo,
        retry_after: Duration,
    },

    // Infrastructure errors (absorbed by the orchestrator, never surfaced)
    #[error("store unavailable ({store}): {message}")]
    StoreUnavailable { store: String, message: String },

    // Backend errors
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// The backend answered, but its output broke the structural contract.
    #[error("generation incomplete: {0}")]
    GenerationIncomplete(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MuninnError {
    /// Shorthand for a [`StoreUnavailable`](Self::StoreUnavailable) error.
    pub fn store(store: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MuninnError::StoreUnavailable {
            store: store.into(),
            message: message.to_string(),
        }
    }

    /// Stable, wire-facing classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MuninnError::InvalidRequest(_) | MuninnError::Json(_) => ErrorKind::InvalidRequest,
            MuninnError::RateLimited { .. } => ErrorKind::RateLimited,
            MuninnError::StoreUnavailable { .. } | MuninnError::Io(_) => ErrorKind::StoreUnavailable,
            MuninnError::GenerationFailed(_) => ErrorKind::GenerationFailed,
            MuninnError::GenerationIncomplete(_) => ErrorKind::GenerationIncomplete,
            MuninnError::Configuration(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    ///
    /// Rate limiting is retryable only after `retry_after`; invalid requests
    /// never are. The orchestrator itself never retries generation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimited
                | ErrorKind::StoreUnavailable
                | ErrorKind::GenerationFailed
                | ErrorKind::GenerationIncomplete
        )
    }

    /// Suggested delay before retrying, if the error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MuninnError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Message safe to hand to an end user.
    ///
    /// Infrastructure and configuration details stay in the logs.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::StoreUnavailable | ErrorKind::Internal => {
                "internal error, please retry".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Wire-facing error kind carried in every failed [`Response`](crate::Response).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidRequest,
    RateLimited,
    StoreUnavailable,
    GenerationFailed,
    GenerationIncomplete,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::StoreUnavailable => "StoreUnavailable",
            ErrorKind::GenerationFailed => "GenerationFailed",
            ErrorKind::GenerationIncomplete => "GenerationIncomplete",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for Muninn operations
pub type Result<T> = std::result::Result<T, MuninnError>;
