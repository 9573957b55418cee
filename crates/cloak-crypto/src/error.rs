use thiserror::Error;

/// Errors from the Crypto Service client.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("crypto API error: {status} {message}")]
    Api { status: u16, message: String },

    /// The named key does not exist at the service.
    #[error("unknown key: {0}")]
    UnknownKey(String),

    /// The service returned a body the client could not interpret.
    #[error("malformed response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
