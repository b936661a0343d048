use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CacheTtls;
use crate::result::{ForecastResult, ModelArtifact, ModelPerformance};
use crate::signature::DatasetSignature;

use super::store::{CacheError, CacheStore};

pub const FORECAST_PREFIX: &str = "forecast";
pub const PERFORMANCE_PREFIX: &str = "performance";
pub const MODEL_PREFIX: &str = "model";

/// Longest lifetime a record is stored with: one year.
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

pub fn forecast_key(signature: &DatasetSignature, horizon: usize) -> String {
    format!("{FORECAST_PREFIX}:{signature}:h{horizon}")
}

pub fn performance_key(model_name: &str) -> String {
    format!("{PERFORMANCE_PREFIX}:{model_name}")
}

pub fn model_key(model_name: &str) -> String {
    format!("{MODEL_PREFIX}:{model_name}")
}

/// Stored envelope around every cached record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub payload: T,
    pub ttl_secs: u64,
    pub stored_at: DateTime<Utc>,
}

/// Typed, namespaced access to forecasts, performance records and model
/// artifacts.
///
/// The cache is an optimization, never a correctness dependency: every read
/// failure is a miss and every write failure is reported as `false`. Nothing
/// here returns an error.
#[derive(Debug, Clone)]
pub struct ResultCache<S> {
    store: S,
    ttls: CacheTtls,
}

impl<S: CacheStore> ResultCache<S> {
    pub fn new(store: S) -> Self {
        Self::with_ttls(store, CacheTtls::default())
    }

    pub fn with_ttls(store: S, ttls: CacheTtls) -> Self {
        Self { store, ttls }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    pub async fn get_forecast(
        &self,
        signature: &DatasetSignature,
        horizon: usize,
    ) -> Option<ForecastResult> {
        self.read(&forecast_key(signature, horizon)).await
    }

    pub async fn set_forecast(
        &self,
        signature: &DatasetSignature,
        horizon: usize,
        result: &ForecastResult,
        ttl_secs: u64,
    ) -> bool {
        self.write(&forecast_key(signature, horizon), result, ttl_secs)
            .await
    }

    pub async fn delete_forecast(&self, signature: &DatasetSignature, horizon: usize) -> bool {
        self.remove(&forecast_key(signature, horizon)).await
    }

    pub async fn get_model_performance(&self, model_name: &str) -> Option<ModelPerformance> {
        self.read(&performance_key(model_name)).await
    }

    pub async fn set_model_performance(
        &self,
        model_name: &str,
        performance: &ModelPerformance,
        ttl_secs: u64,
    ) -> bool {
        self.write(&performance_key(model_name), performance, ttl_secs)
            .await
    }

    pub async fn delete_model_performance(&self, model_name: &str) -> bool {
        self.remove(&performance_key(model_name)).await
    }

    pub async fn get_model_artifact(&self, model_name: &str) -> Option<ModelArtifact> {
        self.read(&model_key(model_name)).await
    }

    pub async fn set_model_artifact(
        &self,
        model_name: &str,
        artifact: &ModelArtifact,
        ttl_secs: u64,
    ) -> bool {
        self.write(&model_key(model_name), artifact, ttl_secs).await
    }

    pub async fn flush_all(&self) -> bool {
        match self.store.flush().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "cache flush failed");
                false
            }
        }
    }

    /// Full envelope of a cached record (payload plus storage metadata).
    pub async fn entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed; treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry<T>>(&raw) {
            Ok(entry) => {
                debug!(key, stored_at = %entry.stored_at, "cache hit");
                Some(entry)
            }
            Err(e) => {
                warn!(key, error = %e, "corrupt cache entry; treating as miss");
                None
            }
        }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.entry(key).await.map(|e| e.payload)
    }

    async fn write<T: Serialize + Sync>(&self, key: &str, payload: &T, ttl_secs: u64) -> bool {
        // Stores reject zero lifetimes (Redis `SET EX 0`), so the floor is one second.
        let ttl_secs = ttl_secs.clamp(1, MAX_TTL_SECS);
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            ttl_secs,
            stored_at: Utc::now(),
        };

        let result = match serde_json::to_string(&entry) {
            Ok(json) => {
                self.store
                    .set(key, json, Duration::from_secs(ttl_secs))
                    .await
            }
            Err(e) => Err(CacheError::Serialization(e.to_string())),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "cache write failed");
                false
            }
        }
    }

    async fn remove(&self, key: &str) -> bool {
        match self.store.delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(key, error = %e, "cache delete failed");
                false
            }
        }
    }
}
