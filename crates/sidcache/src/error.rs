//! Error types for the cache layer

use sidcache_store::StoreError;
use thiserror::Error;

/// Cache error types
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// A record ended before a field could be read
    #[error("corrupt record: reading {field} needs {needed} bytes, {available} left")]
    Corrupt {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    /// A record field decoded to something impossible
    #[error("malformed record: {0}")]
    Malformed(String),

    /// The underlying store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The store is closed (caching disabled or not yet opened)
    #[error("cache store is not open")]
    Closed,

    /// A SID was not usable for the requested operation
    #[error("invalid SID: {0}")]
    InvalidSid(String),

    /// Configuration could not be loaded or failed validation
    #[error("invalid cache configuration: {0}")]
    Config(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_display() {
        let err = CacheError::Corrupt { field: "u32", needed: 4, available: 1 };
        assert_eq!(err.to_string(), "corrupt record: reading u32 needs 4 bytes, 1 left");
    }

    #[test]
    fn test_store_error_converts() {
        let err: CacheError = StoreError::KeyExists { key_len: 3 }.into();
        assert!(matches!(err, CacheError::Store(StoreError::KeyExists { key_len: 3 })));
    }
}
