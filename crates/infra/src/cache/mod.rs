//! Cache store selection.

use std::sync::Arc;

use forgecast_ai::{CacheStore, InMemoryCacheStore};
use tracing::info;

use crate::config::EngineSettings;

#[cfg(feature = "redis")]
pub mod redis_store;

#[cfg(feature = "redis")]
pub use redis_store::RedisCacheStore;

/// Builds the store named by the settings: Redis when a URL is configured,
/// otherwise a process-local in-memory store.
pub async fn connect(settings: &EngineSettings) -> anyhow::Result<Arc<dyn CacheStore>> {
    match settings.redis_url.as_deref() {
        #[cfg(feature = "redis")]
        Some(url) => {
            let store = RedisCacheStore::connect(url, settings.cache_timeout).await?;
            info!(prefix = store.prefix(), "using redis cache store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => anyhow::bail!(
            "FORGECAST_REDIS_URL is set but forgecast-infra was built without the `redis` feature"
        ),
        None => {
            info!("using in-memory cache store");
            Ok(Arc::new(InMemoryCacheStore::new()))
        }
    }
}
