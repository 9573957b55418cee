use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Records error: {0}")]
    Records(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Job queue error: {0}")]
    Jobs(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Short error code string surfaced to clients in error frames.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::AuthFailed(_) => "AUTH_FAILED",
            CoreError::BadRequest(_) => "BAD_REQUEST",
            CoreError::PermissionDenied { .. } => "PERMISSION_DENIED",
            CoreError::Cache(_) => "CACHE_ERROR",
            CoreError::Records(_) => "RECORDS_ERROR",
            CoreError::Crypto(_) => "CRYPTO_ERROR",
            CoreError::Jobs(_) => "JOB_QUEUE_ERROR",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
            CoreError::Io(_) => "IO_ERROR",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
