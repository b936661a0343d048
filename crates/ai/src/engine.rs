//! Forecast orchestrator.
//!
//! [`ForecastEngine`] owns every piece of shared state explicitly: the model
//! registry, the live ensemble weights, the per-model trained state and the
//! training lock. Request handlers get it by reference (typically behind an
//! `Arc`); there are no globals.
//!
//! Per request:
//!
//! ```text
//! CHECK_CACHE -> HIT: return
//!             -> MISS: infer every model -> combine -> confidence band
//!                      -> cache write -> return
//! ```
//!
//! A model that cannot forecast (not trained, bad features, numeric failure)
//! is replaced by a trailing moving average, so the ensemble always
//! completes. Cache failures degrade to misses inside [`ResultCache`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{Span, debug, field, info, instrument, warn};
use uuid::Uuid;

use forgecast_core::{Dataset, EngineError, EngineResult};

use crate::cache::{CacheStore, ResultCache};
use crate::config::EngineConfig;
use crate::ensemble::{self, EnsembleWeights};
use crate::features::{DataSource, FeaturePipeline, StandardPipeline};
use crate::model::{FittedModel, ForecastModel, InputShape, ModelFamily};
use crate::registry::ModelRegistry;
use crate::request::ForecastOptions;
use crate::result::{ForecastResult, ModelArtifact, ModelForecast, ModelPerformance};
use crate::signature::{DatasetSignature, SignatureService};
use crate::trainer::{TrainedModelState, Trainer, TrainingOutcome, TrainingReport};

/// Per-model view returned by [`ForecastEngine::model_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub name: String,
    pub family: ModelFamily,
    pub input_shape: InputShape,
    pub horizon_length: usize,
    /// Fitted parameters are held by this process.
    pub has_parameters: bool,
    pub last_trained: Option<DateTime<Utc>>,
    pub performance: Option<ModelPerformance>,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub models: BTreeMap<String, ModelPerformance>,
    pub weights: BTreeMap<String, f64>,
    /// Ensemble-weighted mean accuracy estimate over models with a record.
    pub average_accuracy: Option<f64>,
    pub trained_count: usize,
}

pub struct ForecastEngine<S, P = StandardPipeline> {
    config: EngineConfig,
    registry: ModelRegistry,
    pipeline: P,
    cache: ResultCache<S>,
    signatures: SignatureService,
    trainer: Trainer,
    weights: RwLock<EnsembleWeights>,
    states: RwLock<HashMap<String, TrainedModelState>>,
    /// Held for the duration of a training run; one run per engine.
    training: Mutex<()>,
}

impl<S: CacheStore> ForecastEngine<S, StandardPipeline> {
    pub fn new(store: S, config: EngineConfig) -> EngineResult<Self> {
        let pipeline = StandardPipeline::from_config(&config);
        Self::with_pipeline(store, pipeline, config)
    }
}

impl<S: CacheStore, P: FeaturePipeline> ForecastEngine<S, P> {
    pub fn with_pipeline(store: S, pipeline: P, config: EngineConfig) -> EngineResult<Self> {
        let registry = ModelRegistry::from_config(&config)?;
        Self::with_registry(store, pipeline, registry, config)
    }

    pub fn with_registry(
        store: S,
        pipeline: P,
        registry: ModelRegistry,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        if config.max_horizon == 0 {
            return Err(EngineError::validation("max_horizon must be positive"));
        }
        if registry.is_empty() {
            return Err(EngineError::validation("no models registered"));
        }

        let weights = EnsembleWeights::new(config.default_weights.clone())?;
        weights.ensure_known(registry.names())?;

        let states = registry
            .names()
            .map(|name| (name.to_string(), TrainedModelState::default()))
            .collect();

        Ok(Self {
            cache: ResultCache::with_ttls(store, config.ttl),
            signatures: SignatureService::from_config(&config),
            trainer: Trainer,
            weights: RwLock::new(weights),
            states: RwLock::new(states),
            training: Mutex::new(()),
            registry,
            pipeline,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ResultCache<S> {
        &self.cache
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Signature a request for `dataset`/`horizon`/`options` is cached under.
    pub fn signature_for(
        &self,
        dataset: &Dataset,
        horizon: usize,
        options: &ForecastOptions,
    ) -> DatasetSignature {
        self.signatures
            .signature(dataset, &options.signature_input(horizon))
    }

    #[instrument(
        skip(self, dataset, options),
        fields(observations = dataset.len(), signature = field::Empty),
        err
    )]
    pub async fn generate_forecast(
        &self,
        dataset: &Dataset,
        horizon: usize,
        options: &ForecastOptions,
    ) -> EngineResult<ForecastResult> {
        if horizon == 0 || horizon > self.config.max_horizon {
            return Err(EngineError::validation(format!(
                "horizon must be in 1..={}, got {horizon}",
                self.config.max_horizon
            )));
        }
        let level = options.level();

        let signature = self.signature_for(dataset, horizon, options);
        Span::current().record("signature", signature.as_str());

        if let Some(hit) = self.cache.get_forecast(&signature, horizon).await {
            debug!("forecast served from cache");
            return Ok(hit);
        }

        let result = self.compute_forecast(dataset, horizon, level, signature);

        let ttl = options
            .cache_ttl_secs
            .unwrap_or(self.config.ttl.forecast_secs);
        if !self
            .cache
            .set_forecast(&result.signature, horizon, &result, ttl)
            .await
        {
            debug!("forecast not cached");
        }
        Ok(result)
    }

    fn compute_forecast(
        &self,
        dataset: &Dataset,
        horizon: usize,
        level: f64,
        signature: DatasetSignature,
    ) -> ForecastResult {
        let weights = self.ensemble_weights();
        let mut per_model_forecasts = BTreeMap::new();
        let mut data_source = DataSource::Observed;

        for model in self.registry.iter() {
            let (forecast, source) = self.forecast_one(model, dataset, horizon);
            if source.is_synthetic() {
                data_source = DataSource::Synthetic;
            }
            per_model_forecasts.insert(model.name().to_string(), forecast);
        }

        let combined = ensemble::combine(
            per_model_forecasts
                .iter()
                .map(|(name, f)| (name.as_str(), f.values.as_slice())),
            &weights,
            horizon,
            level,
        );

        let result = ForecastResult {
            signature,
            horizon,
            per_model_forecasts,
            ensemble_forecast: combined.ensemble,
            confidence_upper: combined.upper,
            confidence_lower: combined.lower,
            confidence_level: level,
            data_source,
            generated_at: Utc::now(),
        };
        info!(
            fallbacks = result.fallback_count(),
            synthetic = data_source.is_synthetic(),
            "forecast generated"
        );
        result
    }

    /// One model's forecast, or the moving-average fallback.
    fn forecast_one(
        &self,
        model: &ForecastModel,
        dataset: &Dataset,
        horizon: usize,
    ) -> (ModelForecast, DataSource) {
        let prepared = match model.prepare_features(&self.pipeline, dataset) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(model = %model.name(), error = %e, "feature preparation failed; using fallback");
                let values = self.fallback_forecast(&dataset.values(), horizon);
                return (ModelForecast::fallback(values, e.to_string()), DataSource::Observed);
            }
        };
        let source = prepared.metadata.data_source;

        let inferred = self
            .fitted(model.name())
            .ok_or_else(|| EngineError::ModelNotTrained(model.name().to_string()))
            .and_then(|fitted| model.infer(&fitted, &prepared));

        match inferred {
            Ok(values) => (ModelForecast::model(fit_horizon(values, horizon)), source),
            Err(e) => {
                warn!(model = %model.name(), error = %e, "inference failed; using fallback");
                let values = self.fallback_forecast(&prepared.history, horizon);
                (ModelForecast::fallback(values, e.to_string()), source)
            }
        }
    }

    /// Mean of the trailing `fallback_window` finite values, repeated.
    fn fallback_forecast(&self, history: &[f64], horizon: usize) -> Vec<f64> {
        let finite: Vec<f64> = history.iter().copied().filter(|v| v.is_finite()).collect();
        let window = self.config.fallback_window.max(1);
        let tail = &finite[finite.len().saturating_sub(window)..];
        let level = if tail.is_empty() {
            0.0
        } else {
            tail.iter().sum::<f64>() / tail.len() as f64
        };
        vec![level; horizon]
    }

    fn fitted(&self, name: &str) -> Option<Arc<FittedModel>> {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);
        states.get(name).and_then(|s| s.fitted().cloned())
    }

    /// Trains one model. Fails fast when another run holds the training lock.
    #[instrument(skip(self, dataset), fields(observations = dataset.len()), err)]
    pub async fn train_model(
        &self,
        model_name: &str,
        dataset: &Dataset,
    ) -> EngineResult<TrainingOutcome> {
        let model = self.registry.get(model_name)?;
        let _guard = self
            .training
            .try_lock()
            .map_err(|_| EngineError::TrainingInProgress)?;
        self.train_locked(model, dataset).await
    }

    /// Trains every registered model under one acquisition of the training
    /// lock. Per-model failures are collected, not propagated.
    #[instrument(skip(self, dataset), fields(observations = dataset.len()), err)]
    pub async fn train_all_models(&self, dataset: &Dataset) -> EngineResult<TrainingReport> {
        let _guard = self
            .training
            .try_lock()
            .map_err(|_| EngineError::TrainingInProgress)?;

        let mut report = TrainingReport::default();
        for model in self.registry.iter() {
            match self.train_locked(model, dataset).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    warn!(model = %model.name(), error = %e, "training failed");
                    report.failures.insert(model.name().to_string(), e.to_string());
                }
            }
        }
        info!(
            trained = report.outcomes.len(),
            failed = report.failures.len(),
            "training run finished"
        );
        Ok(report)
    }

    async fn train_locked(
        &self,
        model: &ForecastModel,
        dataset: &Dataset,
    ) -> EngineResult<TrainingOutcome> {
        let started = Instant::now();
        let run_id = Uuid::now_v7();
        let name = model.name();
        info!(model = %name, %run_id, "training started");

        let prepared = model.prepare_features(&self.pipeline, dataset)?;
        let state = self.trainer.train(model, &prepared)?;
        let performance = state
            .performance()
            .cloned()
            .ok_or_else(|| EngineError::numeric("training produced no evaluation"))?;

        {
            let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
            states.insert(name.to_string(), state);
        }

        let config = model.config();
        let artifact = ModelArtifact {
            model: name.to_string(),
            family: config.family,
            run_id,
            feature_names: prepared.metadata.feature_names.clone(),
            input_shape: prepared.metadata.input_shape,
            horizon_length: config.horizon_length,
            sample_count: performance.sample_count,
            data_source: prepared.metadata.data_source,
            trained_at: performance.last_trained,
        };
        let ttl = self.config.ttl;
        self.cache
            .set_model_performance(name, &performance, ttl.performance_secs)
            .await;
        self.cache
            .set_model_artifact(name, &artifact, ttl.artifact_secs)
            .await;

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            model = %name,
            %run_id,
            duration_ms,
            mse = performance.mse,
            accuracy = performance.accuracy_estimate,
            "training finished"
        );

        Ok(TrainingOutcome {
            run_id,
            model: name.to_string(),
            sample_count: performance.sample_count,
            performance,
            duration_ms,
            data_source: prepared.metadata.data_source,
        })
    }

    /// Replaces the live ensemble weights. Rejected maps leave the previous
    /// weights in place.
    pub fn update_ensemble_weights(&self, weights: BTreeMap<String, f64>) -> EngineResult<()> {
        let weights = EnsembleWeights::new(weights)?;
        weights.ensure_known(self.registry.names())?;
        info!(weights = ?weights.as_map(), "ensemble weights updated");
        *self.weights.write().unwrap_or_else(PoisonError::into_inner) = weights;
        Ok(())
    }

    /// Snapshot of the live weights.
    pub fn ensemble_weights(&self) -> EnsembleWeights {
        self.weights
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn model_state(&self, name: &str) -> Option<TrainedModelState> {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);
        states.get(name).cloned()
    }

    pub fn model_status(&self) -> Vec<ModelStatus> {
        let weights = self.ensemble_weights();
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);

        self.registry
            .iter()
            .map(|model| {
                let config = model.config();
                let state = states.get(model.name());
                ModelStatus {
                    name: config.name.clone(),
                    family: config.family,
                    input_shape: config.input_shape,
                    horizon_length: config.horizon_length,
                    has_parameters: state.is_some_and(TrainedModelState::has_parameters),
                    last_trained: state.and_then(TrainedModelState::last_trained),
                    performance: state.and_then(|s| s.performance().cloned()),
                    weight: weights.get(model.name()),
                }
            })
            .collect()
    }

    pub fn performance_metrics(&self) -> PerformanceSummary {
        let weights = self.ensemble_weights();
        let models: BTreeMap<String, ModelPerformance> = {
            let states = self.states.read().unwrap_or_else(PoisonError::into_inner);
            states
                .iter()
                .filter_map(|(name, s)| s.performance().map(|p| (name.clone(), p.clone())))
                .collect()
        };

        let average_accuracy = if models.is_empty() {
            None
        } else {
            let total_weight: f64 = models.keys().map(|n| weights.get(n)).sum();
            let value = if total_weight > 0.0 {
                models
                    .iter()
                    .map(|(n, p)| p.accuracy_estimate * weights.get(n))
                    .sum::<f64>()
                    / total_weight
            } else {
                models.values().map(|p| p.accuracy_estimate).sum::<f64>() / models.len() as f64
            };
            Some(value)
        };

        PerformanceSummary {
            trained_count: models.len(),
            models,
            weights: weights.as_map().clone(),
            average_accuracy,
        }
    }

    /// Loads cached performance records for every registered model.
    ///
    /// Returns how many records were adopted. Fitted parameters are not
    /// cached, so hydrated models still forecast through the fallback until
    /// retrained.
    #[instrument(skip(self))]
    pub async fn hydrate_from_cache(&self) -> usize {
        let mut cached = Vec::new();
        for name in self.registry.names() {
            if let Some(performance) = self.cache.get_model_performance(name).await {
                cached.push((name.to_string(), performance));
            }
        }

        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        let adopted = cached
            .into_iter()
            .filter(|(name, performance)| {
                states
                    .entry(name.clone())
                    .or_default()
                    .hydrate(performance.clone())
            })
            .count();
        info!(adopted, "performance records hydrated from cache");
        adopted
    }

    pub async fn flush_cache(&self) -> bool {
        self.cache.flush_all().await
    }
}

/// Truncates, or extends by repeating the last value, to `horizon` steps.
fn fit_horizon(mut values: Vec<f64>, horizon: usize) -> Vec<f64> {
    let last = values.last().copied().unwrap_or(0.0);
    values.resize(horizon, last);
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;

    fn engine() -> ForecastEngine<InMemoryCacheStore> {
        ForecastEngine::new(InMemoryCacheStore::new(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn horizon_is_fitted_both_ways() {
        assert_eq!(fit_horizon(vec![1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
        assert_eq!(fit_horizon(vec![1.0, 2.0], 4), vec![1.0, 2.0, 2.0, 2.0]);
        assert_eq!(fit_horizon(vec![], 2), vec![0.0, 0.0]);
    }

    #[test]
    fn fallback_averages_trailing_window() {
        let engine = engine();
        let history: Vec<f64> = (1..=10).map(f64::from).collect();
        // Last 7 values are 4..=10, mean 7.
        assert_eq!(engine.fallback_forecast(&history, 3), vec![7.0; 3]);
        assert_eq!(engine.fallback_forecast(&[], 2), vec![0.0; 2]);
        assert_eq!(
            engine.fallback_forecast(&[f64::NAN, 2.0, 4.0], 1),
            vec![3.0]
        );
    }

    #[test]
    fn rejects_default_weights_naming_unknown_models() {
        let mut config = EngineConfig::default();
        config.default_weights = [("lstm".to_string(), 1.0)].into();
        let err = ForecastEngine::new(InMemoryCacheStore::new(), config)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::InvalidWeights(_)));
    }

    #[test]
    fn status_lists_every_model_untrained() {
        let status = engine().model_status();
        assert_eq!(status.len(), 4);
        assert!(status.iter().all(|s| !s.has_parameters && s.last_trained.is_none()));
        let total: f64 = status.iter().map(|s| s.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_metrics_have_no_average() {
        let summary = engine().performance_metrics();
        assert_eq!(summary.trained_count, 0);
        assert_eq!(summary.average_accuracy, None);
        assert_eq!(summary.weights.len(), 4);
    }
}
