//! Visual judge errors.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for judge operations
pub type JudgeResult<T> = Result<T, JudgeError>;

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Image error for {path}: {message}")]
    Image { path: PathBuf, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Rate limited by evaluator")]
    RateLimited { retry_after_seconds: Option<u64> },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Malformed evaluator response: {0}")]
    MalformedResponse(String),

    #[error("Evaluator unavailable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<JudgeError> },
}

impl JudgeError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16, message: String, retry_after_seconds: Option<u64>) -> Self {
        match status {
            401 | 403 => JudgeError::Authentication(message),
            429 => JudgeError::RateLimited { retry_after_seconds },
            _ => JudgeError::Api { status, message },
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            JudgeError::Network(_) | JudgeError::Timeout(_) | JudgeError::RateLimited { .. } => true,
            JudgeError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn image(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        JudgeError::Image {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<reqwest::Error> for JudgeError {
    fn from(e: reqwest::Error) -> Self {
        JudgeError::Network(e.to_string())
    }
}
