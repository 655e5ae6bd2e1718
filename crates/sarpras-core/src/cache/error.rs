//! Cache error types.

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Failed to serialize or deserialize a cached value.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A `get_or_set` producer failed; the cache was left unpopulated.
    #[error("Producer failed for key {key}: {message}")]
    Producer { key: String, message: String },
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

impl CacheError {
    /// Wraps a producer failure for the given key.
    pub fn producer(key: &str, err: impl std::fmt::Display) -> Self {
        CacheError::Producer {
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_display() {
        let err = CacheError::producer("barang:all", "connection refused");
        assert!(err.to_string().contains("barang:all"));
        assert!(err.to_string().contains("connection refused"));

        let err = CacheError::Serialization("invalid JSON".to_string());
        assert!(err.to_string().contains("invalid JSON"));
    }
}
