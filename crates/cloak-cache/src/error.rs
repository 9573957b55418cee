use thiserror::Error;

/// Errors that can occur inside the Cache Layer.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A KV command failed (connection, protocol, or server-side).
    #[error("kv error: {0}")]
    Kv(#[from] redis::RedisError),

    /// A cached value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The cache contradicts itself, e.g. a chat present in the master
    /// sorted set with no versions hash and no reconstruction path.
    #[error("cache inconsistency: {0}")]
    Inconsistent(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
