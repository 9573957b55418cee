use thiserror::Error;

/// Errors from the Records Store client.
#[derive(Debug, Error)]
pub enum RecordsError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("records API error: {status} {message}")]
    Api { status: u16, message: String },

    /// A response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, RecordsError>;
