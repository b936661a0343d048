//! Fitting and in-sample evaluation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use forgecast_core::{EngineError, EngineResult};

use crate::features::{DataSource, PreparedFeatures};
use crate::model::{FittedModel, ForecastModel};
use crate::result::ModelPerformance;

/// Variance below which R² is undefined.
const DEGENERATE_VARIANCE: f64 = 1e-12;

/// Fitted parameters and evaluation of one registered model.
///
/// Owned by the engine, one per model name. Parameters never leave the
/// process; the performance record may be rehydrated from the cache without
/// them.
#[derive(Debug, Clone, Default)]
pub struct TrainedModelState {
    fitted: Option<Arc<FittedModel>>,
    performance: Option<ModelPerformance>,
}

impl TrainedModelState {
    pub fn fitted(&self) -> Option<&Arc<FittedModel>> {
        self.fitted.as_ref()
    }

    pub fn performance(&self) -> Option<&ModelPerformance> {
        self.performance.as_ref()
    }

    pub fn has_parameters(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn last_trained(&self) -> Option<DateTime<Utc>> {
        self.performance.as_ref().map(|p| p.last_trained)
    }

    /// Adopts a cached performance record unless a fresher one is held.
    pub(crate) fn hydrate(&mut self, performance: ModelPerformance) -> bool {
        match &self.performance {
            Some(current) if current.last_trained >= performance.last_trained => false,
            _ => {
                self.performance = Some(performance);
                true
            }
        }
    }
}

/// Result of one successful training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub run_id: Uuid,
    pub model: String,
    pub performance: ModelPerformance,
    pub duration_ms: u64,
    pub data_source: DataSource,
    pub sample_count: usize,
}

/// Result of training every registered model in one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub outcomes: Vec<TrainingOutcome>,
    /// Model name to failure message.
    pub failures: BTreeMap<String, String>,
}

impl TrainingReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn outcome(&self, model: &str) -> Option<&TrainingOutcome> {
        self.outcomes.iter().find(|o| o.model == model)
    }
}

/// Fits a model and evaluates it on the set it was fitted to.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trainer;

impl Trainer {
    #[instrument(skip_all, fields(model = %model.name()))]
    pub fn train(
        &self,
        model: &ForecastModel,
        prepared: &PreparedFeatures,
    ) -> EngineResult<TrainedModelState> {
        let fitted = model.train(prepared)?;
        let performance = self.evaluate(&fitted, prepared)?;
        info!(
            samples = performance.sample_count,
            mse = performance.mse,
            mae = performance.mae,
            accuracy = performance.accuracy_estimate,
            final_loss = fitted.final_loss(),
            "model fitted"
        );
        Ok(TrainedModelState {
            fitted: Some(Arc::new(fitted)),
            performance: Some(performance),
        })
    }

    pub fn evaluate(
        &self,
        fitted: &FittedModel,
        prepared: &PreparedFeatures,
    ) -> EngineResult<ModelPerformance> {
        let mut predicted = Vec::new();
        let mut actual = Vec::new();
        for (input, target) in prepared.training_pairs() {
            predicted.extend(fitted.predict(input)?);
            actual.extend_from_slice(target);
        }
        if actual.is_empty() {
            return Err(EngineError::insufficient_data("nothing to evaluate"));
        }

        Ok(ModelPerformance {
            last_trained: Utc::now(),
            sample_count: prepared.metadata.training_samples,
            ..metrics(&predicted, &actual)
        })
    }
}

/// Regression metrics over paired values.
///
/// R² is omitted when the targets have no variance. The accuracy estimate is
/// `1 - RMSE / mean|y|`, clamped to `[0, 1]`.
pub fn metrics(predicted: &[f64], actual: &[f64]) -> ModelPerformance {
    let n = predicted.len().min(actual.len()).max(1) as f64;
    let pairs = predicted.iter().zip(actual);

    let (mut sse, mut sae) = (0.0, 0.0);
    for (p, y) in pairs {
        let r = p - y;
        sse += r * r;
        sae += r.abs();
    }
    let mse = sse / n;
    let mae = sae / n;

    let mean = actual.iter().sum::<f64>() / n;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let r2 = (ss_tot >= DEGENERATE_VARIANCE).then(|| 1.0 - sse / ss_tot);

    let scale = actual.iter().map(|y| y.abs()).sum::<f64>() / n;
    let accuracy_estimate = if scale < DEGENERATE_VARIANCE {
        if mse < DEGENERATE_VARIANCE { 1.0 } else { 0.0 }
    } else {
        (1.0 - mse.sqrt() / scale).clamp(0.0, 1.0)
    };

    ModelPerformance {
        mse,
        mae,
        r2,
        accuracy_estimate,
        last_trained: Utc::now(),
        sample_count: predicted.len().min(actual.len()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::features::{FeaturePipeline, StandardPipeline, synthetic_dataset};
    use crate::model::{Hyperparameters, ModelConfig, ModelFamily};

    #[test]
    fn perfect_predictions() {
        let m = metrics(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert_eq!(m.mse, 0.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.r2, Some(1.0));
        assert_eq!(m.accuracy_estimate, 1.0);
    }

    #[test]
    fn constant_targets_omit_r2() {
        let m = metrics(&[4.0, 6.0], &[5.0, 5.0]);
        assert_eq!(m.r2, None);
        assert_eq!(m.mse, 1.0);
        assert_eq!(m.mae, 1.0);
        assert!((m.accuracy_estimate - 0.8).abs() < 1e-12);
    }

    #[test]
    fn accuracy_is_bounded() {
        let m = metrics(&[100.0, -100.0], &[1.0, 2.0]);
        assert_eq!(m.accuracy_estimate, 0.0);
        let zero = metrics(&[0.0, 0.0], &[0.0, 0.0]);
        assert_eq!(zero.accuracy_estimate, 1.0);
        assert_eq!(zero.r2, None);
    }

    #[test]
    fn hydrate_keeps_the_fresher_record() {
        let mut state = TrainedModelState::default();
        let old = metrics(&[1.0], &[1.0]);
        let newer = ModelPerformance {
            last_trained: old.last_trained + Duration::seconds(10),
            ..old.clone()
        };

        assert!(state.hydrate(newer.clone()));
        assert!(!state.hydrate(old));
        assert_eq!(state.performance(), Some(&newer));
        assert!(!state.has_parameters());
    }

    #[test]
    fn trainer_fits_and_evaluates() {
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let dataset = synthetic_dataset(80, end, 5);
        let config = ModelConfig::for_family(ModelFamily::TreeEnsemble, 7, 30);
        let hp = Hyperparameters {
            epochs: 20,
            ..config.hyperparameters.clone()
        };
        let model = ForecastModel::from_config(config.with_hyperparameters(hp));
        let prepared = StandardPipeline::default()
            .prepare(&dataset, ModelFamily::TreeEnsemble, 7)
            .unwrap();

        let state = Trainer.train(&model, &prepared).unwrap();
        let perf = state.performance().unwrap();
        assert!(state.has_parameters());
        assert_eq!(perf.sample_count, prepared.metadata.training_samples);
        assert!(perf.mse.is_finite());
        assert!((0.0..=1.0).contains(&perf.accuracy_estimate));
    }
}
