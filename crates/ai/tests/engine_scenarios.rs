use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{Notify, watch};

use forgecast_ai::cache::{CacheEntry, MAX_TTL_SECS, forecast_key};
use forgecast_ai::{
    CacheError, CacheStore, DataSource, EngineConfig, FeaturePipeline, ForecastEngine,
    ForecastOptions, ForecastResult, ForecastSource, InMemoryCacheStore, ModelFamily,
    PreparedFeatures, StandardPipeline, synthetic_dataset,
};
use forgecast_core::{Dataset, EngineError, EngineResult};

fn end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap()
}

/// Delegates to the standard pipeline and counts invocations.
#[derive(Clone)]
struct CountingPipeline {
    inner: StandardPipeline,
    calls: Arc<AtomicUsize>,
}

impl CountingPipeline {
    fn new() -> Self {
        Self {
            inner: StandardPipeline::default(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeaturePipeline for CountingPipeline {
    fn prepare(
        &self,
        dataset: &Dataset,
        family: ModelFamily,
        horizon: usize,
    ) -> EngineResult<PreparedFeatures> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.prepare(dataset, family, horizon)
    }
}

struct FailingPipeline;

impl FeaturePipeline for FailingPipeline {
    fn prepare(&self, _: &Dataset, family: ModelFamily, _: usize) -> EngineResult<PreparedFeatures> {
        Err(EngineError::numeric(format!("{family}: broken feature source")))
    }
}

struct DownStore;

#[async_trait]
impl CacheStore for DownStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Timeout(Duration::from_millis(250)))
    }
    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection reset".into()))
    }
    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("connection reset".into()))
    }
    async fn flush(&self) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection reset".into()))
    }
}

/// Blocks every write until the gate opens; signals when a write starts.
struct GatedStore {
    inner: InMemoryCacheStore,
    entered: Notify,
    open: watch::Receiver<bool>,
}

#[async_trait]
impl CacheStore for GatedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entered.notify_one();
        let mut open = self.open.clone();
        open.wait_for(|o| *o)
            .await
            .map_err(|_| CacheError::Unavailable("gate dropped".into()))?;
        self.inner.set(key, value, ttl).await
    }
    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.delete(key).await
    }
    async fn flush(&self) -> Result<(), CacheError> {
        self.inner.flush().await
    }
}

fn assert_band(result: &forgecast_ai::ForecastResult) {
    for i in 0..result.horizon {
        assert!(result.confidence_lower[i] >= 0.0, "step {i}");
        assert!(result.confidence_lower[i] <= result.ensemble_forecast[i], "step {i}");
        assert!(result.ensemble_forecast[i] <= result.confidence_upper[i], "step {i}");
    }
}

#[tokio::test]
async fn cold_cache_then_hit_skips_inference() {
    let pipeline = CountingPipeline::new();
    let store = Arc::new(InMemoryCacheStore::new());
    let engine =
        ForecastEngine::with_pipeline(store.clone(), pipeline.clone(), EngineConfig::default())
            .unwrap();
    let dataset = synthetic_dataset(40, end(), 11);
    let options = ForecastOptions::default();

    let first = engine.generate_forecast(&dataset, 7, &options).await.unwrap();
    let after_first = pipeline.calls();
    assert_eq!(after_first, engine.registry().len());
    assert_eq!(first.ensemble_forecast.len(), 7);
    assert!(
        store
            .keys()
            .contains(&forecast_key(&first.signature, 7))
    );

    let second = engine.generate_forecast(&dataset, 7, &options).await.unwrap();
    assert_eq!(pipeline.calls(), after_first);
    assert_eq!(second, first);
}

#[tokio::test]
async fn short_dataset_uses_synthetic_history() {
    let engine = ForecastEngine::new(InMemoryCacheStore::new(), EngineConfig::default()).unwrap();
    let dataset = Dataset::daily(end(), [12.0, 15.0, 11.0, 14.0, 13.0]);

    let result = engine
        .generate_forecast(&dataset, 7, &ForecastOptions::default())
        .await
        .unwrap();

    assert_eq!(result.data_source, DataSource::Synthetic);
    assert_eq!(result.ensemble_forecast.len(), 7);
    assert_eq!(result.confidence_upper.len(), 7);
    assert_eq!(result.confidence_lower.len(), 7);
    assert_band(&result);
}

#[tokio::test]
async fn trained_performance_survives_a_restart() {
    let store = Arc::new(InMemoryCacheStore::new());
    let dataset = synthetic_dataset(100, end(), 3);

    let engine = ForecastEngine::new(store.clone(), EngineConfig::default()).unwrap();
    let outcome = engine.train_model("sequence", &dataset).await.unwrap();
    assert_eq!(outcome.model, "sequence");
    assert_eq!(outcome.data_source, DataSource::Observed);

    let status = engine.model_status();
    let sequence = status.iter().find(|s| s.name == "sequence").unwrap();
    assert!(sequence.has_parameters);
    assert!(sequence.last_trained.is_some());
    assert_eq!(sequence.performance.as_ref(), Some(&outcome.performance));

    let forecast = engine
        .generate_forecast(&dataset, 7, &ForecastOptions::default())
        .await
        .unwrap();
    assert_eq!(
        forecast.per_model_forecasts["sequence"].source,
        ForecastSource::Model
    );

    // A fresh engine over the same store stands in for a process restart.
    let restarted = ForecastEngine::new(store.clone(), EngineConfig::default()).unwrap();
    assert_eq!(restarted.hydrate_from_cache().await, 1);
    let status = restarted.model_status();
    let sequence = status.iter().find(|s| s.name == "sequence").unwrap();
    assert!(!sequence.has_parameters);
    assert_eq!(sequence.last_trained, Some(outcome.performance.last_trained));
    assert_eq!(restarted.performance_metrics().trained_count, 1);

    let artifact = restarted
        .cache()
        .get_model_artifact("sequence")
        .await
        .unwrap();
    assert_eq!(artifact.run_id, outcome.run_id);
    assert_eq!(artifact.family, ModelFamily::Sequence);
}

#[tokio::test]
async fn every_model_failing_still_answers() {
    let engine =
        ForecastEngine::with_pipeline(InMemoryCacheStore::new(), FailingPipeline, EngineConfig::default())
            .unwrap();
    let dataset = Dataset::daily(end(), (1..=20).map(f64::from));

    let result = engine
        .generate_forecast(&dataset, 10, &ForecastOptions::default())
        .await
        .unwrap();

    assert_eq!(result.ensemble_forecast.len(), 10);
    assert_eq!(result.fallback_count(), engine.registry().len());
    // Trailing 7 values are 14..=20.
    assert!(result.ensemble_forecast.iter().all(|v| (*v - 17.0).abs() < 1e-9));
    assert_band(&result);
}

#[tokio::test]
async fn trained_ensemble_uses_every_model() {
    let engine = ForecastEngine::new(InMemoryCacheStore::new(), EngineConfig::default()).unwrap();
    let dataset = synthetic_dataset(100, end(), 8);

    let report = engine.train_all_models(&dataset).await.unwrap();
    assert!(report.is_complete(), "{:?}", report.failures);
    assert_eq!(report.outcomes.len(), 4);

    let result = engine
        .generate_forecast(&dataset, 10, &ForecastOptions::default().with_confidence_level(99.0))
        .await
        .unwrap();
    assert_eq!(result.fallback_count(), 0);
    assert_eq!(result.ensemble_forecast.len(), 10);
    assert_eq!(result.confidence_level, 0.99);
    assert_band(&result);

    let summary = engine.performance_metrics();
    assert_eq!(summary.trained_count, 4);
    let avg = summary.average_accuracy.unwrap();
    assert!((0.0..=1.0).contains(&avg));
}

#[tokio::test]
async fn weight_updates_are_validated() {
    let engine = ForecastEngine::new(InMemoryCacheStore::new(), EngineConfig::default()).unwrap();
    let before = engine.ensemble_weights();

    let short: BTreeMap<String, f64> = [
        ("sequence".to_string(), 0.5),
        ("tree_ensemble".to_string(), 0.4),
    ]
    .into();
    assert!(matches!(
        engine.update_ensemble_weights(short),
        Err(EngineError::InvalidWeights(_))
    ));

    let unknown: BTreeMap<String, f64> = [("lstm".to_string(), 1.0)].into();
    assert!(matches!(
        engine.update_ensemble_weights(unknown),
        Err(EngineError::InvalidWeights(_))
    ));
    assert_eq!(engine.ensemble_weights(), before);

    let valid: BTreeMap<String, f64> = [
        ("sequence".to_string(), 0.1),
        ("tree_ensemble".to_string(), 0.2),
        ("autoregressive".to_string(), 0.3),
        ("decomposition".to_string(), 0.4),
    ]
    .into();
    engine.update_ensemble_weights(valid).unwrap();
    let after = engine.ensemble_weights();
    assert!((after.sum() - 1.0).abs() <= 1e-3);
    assert_eq!(after.get("decomposition"), 0.4);
}

#[tokio::test]
async fn request_validation_is_caller_visible() {
    let engine = ForecastEngine::new(InMemoryCacheStore::new(), EngineConfig::default()).unwrap();
    let dataset = synthetic_dataset(40, end(), 1);
    let options = ForecastOptions::default();

    for horizon in [0, 366] {
        let err = engine
            .generate_forecast(&dataset, horizon, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "{horizon}");
        assert!(err.is_caller_visible());
    }

    let err = engine.train_model("lstm", &dataset).await.unwrap_err();
    assert_eq!(err, EngineError::ModelNotFound("lstm".into()));
}

#[tokio::test]
async fn unrecognized_confidence_levels_use_the_default_band() {
    let engine = ForecastEngine::new(InMemoryCacheStore::new(), EngineConfig::default()).unwrap();
    let dataset = synthetic_dataset(40, end(), 1);

    for level in [0.0, 1.0, 100.0] {
        let options = ForecastOptions::default().with_confidence_level(level);
        let result = engine.generate_forecast(&dataset, 7, &options).await.unwrap();
        assert_eq!(result.confidence_level, 0.95, "{level}");
        assert_band(&result);
    }
}

#[tokio::test]
async fn ttl_override_applies_to_the_write_back() {
    let store = Arc::new(InMemoryCacheStore::new());
    let engine = ForecastEngine::new(store.clone(), EngineConfig::default()).unwrap();
    let dataset = synthetic_dataset(40, end(), 11);

    let options = ForecastOptions::default().with_cache_ttl(60);
    let result = engine.generate_forecast(&dataset, 7, &options).await.unwrap();
    let entry: CacheEntry<ForecastResult> = engine
        .cache()
        .entry(&forecast_key(&result.signature, 7))
        .await
        .unwrap();
    assert_eq!(entry.ttl_secs, 60);

    let defaulted = engine
        .generate_forecast(&dataset, 14, &ForecastOptions::default())
        .await
        .unwrap();
    let entry: CacheEntry<ForecastResult> = engine
        .cache()
        .entry(&forecast_key(&defaulted.signature, 14))
        .await
        .unwrap();
    assert_eq!(entry.ttl_secs, EngineConfig::default().ttl.forecast_secs);
}

#[tokio::test]
async fn huge_ttl_override_is_capped_not_fatal() {
    let engine = ForecastEngine::new(InMemoryCacheStore::new(), EngineConfig::default()).unwrap();
    let dataset = synthetic_dataset(40, end(), 11);
    let options = ForecastOptions::default().with_cache_ttl(u64::MAX);

    let first = engine.generate_forecast(&dataset, 7, &options).await.unwrap();
    let entry: CacheEntry<ForecastResult> = engine
        .cache()
        .entry(&forecast_key(&first.signature, 7))
        .await
        .unwrap();
    assert_eq!(entry.ttl_secs, MAX_TTL_SECS);

    let second = engine.generate_forecast(&dataset, 7, &options).await.unwrap();
    assert_eq!(second, first);
}

#[tokio::test]
async fn concurrent_training_is_rejected() {
    let (open_tx, open_rx) = watch::channel(false);
    let store = Arc::new(GatedStore {
        inner: InMemoryCacheStore::new(),
        entered: Notify::new(),
        open: open_rx,
    });
    let engine =
        Arc::new(ForecastEngine::new(store.clone(), EngineConfig::default()).unwrap());
    let dataset = synthetic_dataset(60, end(), 4);

    let running = {
        let engine = engine.clone();
        let dataset = dataset.clone();
        tokio::spawn(async move { engine.train_model("autoregressive", &dataset).await })
    };

    // The first run is now parked inside its cache write, holding the lock.
    store.entered.notified().await;

    let err = engine.train_model("tree_ensemble", &dataset).await.unwrap_err();
    assert_eq!(err, EngineError::TrainingInProgress);
    let err = engine.train_all_models(&dataset).await.unwrap_err();
    assert_eq!(err, EngineError::TrainingInProgress);
    // Unknown names are reported before the lock is consulted.
    let err = engine.train_model("lstm", &dataset).await.unwrap_err();
    assert!(matches!(err, EngineError::ModelNotFound(_)));

    open_tx.send(true).unwrap();
    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome.model, "autoregressive");

    // Lock released: training works again.
    engine.train_model("tree_ensemble", &dataset).await.unwrap();
}

#[tokio::test]
async fn unavailable_cache_never_reaches_the_caller() {
    let engine = ForecastEngine::new(DownStore, EngineConfig::default()).unwrap();
    let dataset = synthetic_dataset(60, end(), 6);

    let result = engine
        .generate_forecast(&dataset, 7, &ForecastOptions::default())
        .await
        .unwrap();
    assert_eq!(result.ensemble_forecast.len(), 7);

    engine.train_model("decomposition", &dataset).await.unwrap();
    assert_eq!(engine.hydrate_from_cache().await, 0);
    assert!(!engine.flush_cache().await);
}

#[tokio::test]
async fn flush_clears_cached_forecasts() {
    let store = Arc::new(InMemoryCacheStore::new());
    let engine = ForecastEngine::new(store.clone(), EngineConfig::default()).unwrap();
    let dataset = synthetic_dataset(40, end(), 2);

    engine
        .generate_forecast(&dataset, 7, &ForecastOptions::default())
        .await
        .unwrap();
    assert!(!store.is_empty());

    assert!(engine.flush_cache().await);
    assert!(store.is_empty());
}
