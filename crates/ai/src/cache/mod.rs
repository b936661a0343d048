//! Result cache: forecasts, model performance and model artifacts under TTL.
//!
//! [`CacheStore`] is the transport seam (in-memory here, Redis in
//! `forgecast-infra`); [`ResultCache`] adds namespacing, JSON envelopes and
//! the degrade-to-miss policy.

mod in_memory;
mod result_cache;
mod store;

pub use in_memory::InMemoryCacheStore;
pub use result_cache::{
    CacheEntry, FORECAST_PREFIX, MAX_TTL_SECS, MODEL_PREFIX, PERFORMANCE_PREFIX, ResultCache, forecast_key,
    model_key, performance_key,
};
pub use store::{CacheError, CacheStore};
