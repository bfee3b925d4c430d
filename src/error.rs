use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The remote store rejected a write because the expected content hash
    /// no longer matches what it holds.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Rate limiting, 5xx responses and network failures that survived the
    /// retry policy.
    #[error("Remote store unavailable: {0}")]
    Transient(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    /// A record would be persisted in a shape the rest of the system cannot
    /// read back. Raised before anything is written.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Content decoding error: {0}")]
    Decode(#[from] base64::DecodeError),
}

impl AppError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            AppError::Transient(err.to_string())
        } else {
            AppError::Remote(err.to_string())
        }
    }
}

impl From<argon2::password_hash::Error> for AppError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AppError::Internal(format!("Password hashing failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
