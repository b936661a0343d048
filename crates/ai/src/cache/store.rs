use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Cache transport failure.
///
/// These never leave [`super::ResultCache`]: every one of them degrades to a
/// cache miss or a failed write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),

    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Generic key/value transport with TTL.
///
/// The engine treats the store as already-consistent shared storage; values
/// are JSON documents.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every entry owned by this store.
    async fn flush(&self) -> Result<(), CacheError>;
}

#[async_trait::async_trait]
impl<S> CacheStore for Arc<S>
where
    S: CacheStore + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        (**self).delete(key).await
    }

    async fn flush(&self) -> Result<(), CacheError> {
        (**self).flush().await
    }
}
