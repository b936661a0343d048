//! Redis-backed [`CacheStore`].
//!
//! - One multiplexed async connection shared by clones of the store.
//! - Keys are namespaced (`forgecast:` by default) so `flush` only removes
//!   this engine's entries: `SCAN MATCH <prefix>*` + `DEL`, never `FLUSHALL`.
//! - Every command runs under the configured timeout; expiry surfaces as
//!   [`CacheError::Timeout`] and degrades to a miss in the result cache.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::debug;

use forgecast_ai::{CacheError, CacheStore};

pub const DEFAULT_PREFIX: &str = "forgecast:";

const SCAN_BATCH: usize = 200;

#[derive(Clone)]
pub struct RedisCacheStore {
    conn: MultiplexedConnection,
    prefix: String,
    timeout: Duration,
}

impl RedisCacheStore {
    /// Opens a client for `url` and establishes the shared connection.
    pub async fn connect(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("invalid redis url")?;
        let conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .with_context(|| format!("timed out connecting to redis after {timeout:?}"))?
            .context("failed to connect to redis")?;
        Ok(Self::new(conn, timeout))
    }

    pub fn new(conn: MultiplexedConnection, timeout: Duration) -> Self {
        Self {
            conn,
            prefix: DEFAULT_PREFIX.to_string(),
            timeout,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn run<T, F>(&self, op: &'static str, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CacheError::Unavailable(format!("{op}: {e}"))),
            Err(_) => Err(CacheError::Timeout(self.timeout)),
        }
    }
}

fn namespaced(prefix: &str, key: &str) -> String {
    format!("{prefix}{key}")
}

/// Whole seconds for `SET EX`, at least one.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let key = namespaced(&self.prefix, key);
        self.run("GET", async move {
            redis::cmd("GET")
                .arg(&key)
                .query_async::<_, Option<String>>(&mut conn)
                .await
        })
        .await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let key = namespaced(&self.prefix, key);
        let secs = expiry_secs(ttl);
        self.run("SET", async move {
            redis::cmd("SET")
                .arg(&key)
                .arg(value)
                .arg("EX")
                .arg(secs)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let key = namespaced(&self.prefix, key);
        let removed = self
            .run("DEL", async move {
                redis::cmd("DEL")
                    .arg(&key)
                    .query_async::<_, i64>(&mut conn)
                    .await
            })
            .await?;
        Ok(removed > 0)
    }

    async fn flush(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", self.prefix);
        let removed = self
            .run("FLUSH", async move {
                let mut cursor: u64 = 0;
                let mut removed: i64 = 0;
                loop {
                    let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await?;
                    if !keys.is_empty() {
                        removed += redis::cmd("DEL")
                            .arg(keys.as_slice())
                            .query_async::<_, i64>(&mut conn)
                            .await?;
                    }
                    if next == 0 {
                        break Ok::<i64, redis::RedisError>(removed);
                    }
                    cursor = next;
                }
            })
            .await?;
        debug!(prefix = %self.prefix, removed, "redis cache namespace flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(
            namespaced(DEFAULT_PREFIX, "forecast:abc:h7"),
            "forgecast:forecast:abc:h7"
        );
    }

    #[test]
    fn sub_second_ttls_round_up() {
        assert_eq!(expiry_secs(Duration::from_millis(10)), 1);
        assert_eq!(expiry_secs(Duration::from_secs(1800)), 1800);
    }

    /// Needs a running server: `FORGECAST_TEST_REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn round_trip_against_live_redis() {
        let Ok(url) = std::env::var("FORGECAST_TEST_REDIS_URL") else {
            return;
        };
        let store = RedisCacheStore::connect(&url, Duration::from_secs(2))
            .await
            .unwrap()
            .with_prefix("forgecast-test:");

        store
            .set("k", "v".to_string(), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.flush().await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.delete("k").await.unwrap());
    }
}
