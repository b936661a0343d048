//! Model families.
//!
//! Four structurally different regressors share one contract
//! (`prepare_features`, `train`, `infer`) through the [`ForecastModel`] tagged
//! union, selected by name at dispatch time:
//!
//! | family | network | input | loss |
//! |---|---|---|---|
//! | `sequence` | Elman recurrent | window × step features | MSE |
//! | `tree_ensemble` | feed-forward | calendar + moving averages | MSE |
//! | `autoregressive` | feed-forward | lags, short MAs, weekly Fourier | MAE |
//! | `decomposition` | feed-forward | trend, multi-period Fourier, holidays | Huber |
//!
//! The three feed-forward families stand in for gradient-boosted trees, ARIMA
//! and Prophet respectively; none of them implements those methods.

mod dense;
mod loss;
mod param;
mod recurrent;
mod scaler;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use forgecast_core::{Dataset, EngineError, EngineResult};

use crate::features::{self, FeatureInput, FeaturePipeline, PreparedFeatures};

use dense::DenseNetwork;
use param::fit;
use recurrent::RecurrentNetwork;
use scaler::{ColumnScaler, StandardScaler};

pub use loss::Loss;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Sequence,
    TreeEnsemble,
    Autoregressive,
    Decomposition,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 4] = [
        ModelFamily::Sequence,
        ModelFamily::TreeEnsemble,
        ModelFamily::Autoregressive,
        ModelFamily::Decomposition,
    ];

    /// Registry name of the family's default model.
    pub fn default_name(&self) -> &'static str {
        match self {
            ModelFamily::Sequence => "sequence",
            ModelFamily::TreeEnsemble => "tree_ensemble",
            ModelFamily::Autoregressive => "autoregressive",
            ModelFamily::Decomposition => "decomposition",
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, ModelFamily::Sequence)
    }
}

impl core::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.default_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InputShape {
    Sequence { window: usize, features: usize },
    Flat { features: usize },
}

impl InputShape {
    /// Number of values per step (sequence) or per sample (flat).
    pub fn feature_width(&self) -> usize {
        match *self {
            InputShape::Sequence { features, .. } | InputShape::Flat { features } => features,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub hidden_units: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub loss: Loss,
    pub seed: u64,
    /// Global gradient-norm ceiling.
    pub grad_clip: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            hidden_units: 16,
            epochs: 120,
            learning_rate: 0.01,
            batch_size: 16,
            loss: Loss::MeanSquared,
            seed: 42,
            grad_clip: 5.0,
        }
    }
}

impl Hyperparameters {
    pub fn for_family(family: ModelFamily) -> Self {
        let base = Self::default();
        match family {
            ModelFamily::Sequence => Self {
                hidden_units: 12,
                epochs: 40,
                batch_size: 8,
                seed: 42,
                ..base
            },
            ModelFamily::TreeEnsemble => Self {
                hidden_units: 32,
                epochs: 150,
                learning_rate: 0.005,
                seed: 43,
                ..base
            },
            ModelFamily::Autoregressive => Self {
                epochs: 150,
                loss: Loss::MeanAbsolute,
                seed: 44,
                ..base
            },
            ModelFamily::Decomposition => Self {
                hidden_units: 24,
                epochs: 150,
                loss: Loss::Huber { delta: 1.0 },
                seed: 45,
                ..base
            },
        }
    }
}

/// Registered model configuration. Immutable after engine initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub family: ModelFamily,
    pub feature_schema: Vec<String>,
    pub input_shape: InputShape,
    pub hyperparameters: Hyperparameters,
    pub horizon_length: usize,
}

impl ModelConfig {
    pub fn for_family(family: ModelFamily, horizon_length: usize, sequence_window: usize) -> Self {
        let feature_schema = features::feature_names(family);
        let input_shape = if family.is_sequence() {
            InputShape::Sequence {
                window: sequence_window,
                features: feature_schema.len(),
            }
        } else {
            InputShape::Flat {
                features: feature_schema.len(),
            }
        };

        Self {
            name: family.default_name().to_string(),
            family,
            feature_schema,
            input_shape,
            hyperparameters: Hyperparameters::for_family(family),
            horizon_length,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }
}

#[derive(Debug, Clone)]
enum FittedNetwork {
    Dense(DenseNetwork),
    Recurrent(RecurrentNetwork),
}

/// Fitted parameters of one model. Opaque outside this module and never
/// serialized: it lives only in the process that trained it.
#[derive(Debug, Clone)]
pub struct FittedModel {
    network: FittedNetwork,
    input_scaler: ColumnScaler,
    target_scaler: StandardScaler,
    final_loss: f64,
    sample_count: usize,
}

impl FittedModel {
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Mean training loss of the last epoch, in scaled target units.
    pub fn final_loss(&self) -> f64 {
        self.final_loss
    }

    /// Predicts one horizon vector in the original value units.
    pub fn predict(&self, input: &FeatureInput) -> EngineResult<Vec<f64>> {
        let scaled = match (&self.network, input) {
            (FittedNetwork::Dense(net), FeatureInput::Flat(x)) => {
                check_width(x.len(), net.input_size())?;
                net.predict(&self.input_scaler.transform(x))
            }
            (FittedNetwork::Recurrent(net), FeatureInput::Sequence(steps)) => {
                if let Some(step) = steps.first() {
                    check_width(step.len(), net.input_size())?;
                }
                let steps: Vec<Vec<f64>> = steps
                    .iter()
                    .map(|s| self.input_scaler.transform(s))
                    .collect();
                net.predict(&steps)
            }
            _ => {
                return Err(EngineError::validation(
                    "feature input kind does not match the fitted network",
                ));
            }
        };

        let values: Vec<f64> = scaled
            .into_iter()
            .map(|v| self.target_scaler.inverse(v))
            .collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::numeric("prediction is not finite"));
        }
        Ok(values)
    }
}

fn check_width(actual: usize, expected: usize) -> EngineResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(EngineError::validation(format!(
            "expected {expected} features, got {actual}"
        )))
    }
}

/// Sequence family: recurrent network over sliding windows.
#[derive(Debug, Clone)]
pub struct SequenceModel {
    config: ModelConfig,
}

impl SequenceModel {
    fn train(&self, prepared: &PreparedFeatures) -> EngineResult<FittedModel> {
        let pairs: Vec<(&[Vec<f64>], &[f64])> = prepared
            .training_pairs()
            .filter_map(|(input, target)| input.as_sequence().map(|s| (s, target)))
            .collect();
        if pairs.is_empty() {
            return Err(EngineError::insufficient_data(format!(
                "{}: no complete window with a full horizon ahead",
                self.config.name
            )));
        }

        let width = self.config.input_shape.feature_width();
        let input_scaler = ColumnScaler::fit(
            pairs.iter().flat_map(|(s, _)| s.iter().map(Vec::as_slice)),
            width,
        );
        let target_scaler = StandardScaler::fit(pairs.iter().flat_map(|(_, t)| t.iter()));

        let samples: Vec<(Vec<Vec<f64>>, Vec<f64>)> = pairs
            .iter()
            .map(|(s, t)| {
                (
                    s.iter().map(|step| input_scaler.transform(step)).collect(),
                    t.iter().map(|v| target_scaler.transform(*v)).collect(),
                )
            })
            .collect();

        let hp = &self.config.hyperparameters;
        let mut rng = StdRng::seed_from_u64(hp.seed);
        let mut net =
            RecurrentNetwork::new(width, hp.hidden_units, self.config.horizon_length, &mut rng);
        let final_loss = fit(&mut net, &samples, hp, &mut rng)?;

        Ok(FittedModel {
            network: FittedNetwork::Recurrent(net),
            input_scaler,
            target_scaler,
            final_loss,
            sample_count: samples.len(),
        })
    }
}

/// Flat-vector families: one-hidden-layer feed-forward regressor.
#[derive(Debug, Clone)]
pub struct FeedForwardModel {
    config: ModelConfig,
}

impl FeedForwardModel {
    fn train(&self, prepared: &PreparedFeatures) -> EngineResult<FittedModel> {
        let pairs: Vec<(&[f64], &[f64])> = prepared
            .training_pairs()
            .filter_map(|(input, target)| input.as_flat().map(|x| (x, target)))
            .collect();
        if pairs.is_empty() {
            return Err(EngineError::insufficient_data(format!(
                "{}: no sample with a full horizon ahead",
                self.config.name
            )));
        }

        let width = self.config.input_shape.feature_width();
        let input_scaler = ColumnScaler::fit(pairs.iter().map(|(x, _)| *x), width);
        let target_scaler = StandardScaler::fit(pairs.iter().flat_map(|(_, t)| t.iter()));

        let samples: Vec<(Vec<f64>, Vec<f64>)> = pairs
            .iter()
            .map(|(x, t)| {
                (
                    input_scaler.transform(x),
                    t.iter().map(|v| target_scaler.transform(*v)).collect(),
                )
            })
            .collect();

        let hp = &self.config.hyperparameters;
        let mut rng = StdRng::seed_from_u64(hp.seed);
        let mut net = DenseNetwork::new(
            &[width, hp.hidden_units.max(1), self.config.horizon_length],
            &mut rng,
        );
        let final_loss = fit(&mut net, &samples, hp, &mut rng)?;

        Ok(FittedModel {
            network: FittedNetwork::Dense(net),
            input_scaler,
            target_scaler,
            final_loss,
            sample_count: samples.len(),
        })
    }
}

/// A registered model, dispatched by family.
#[derive(Debug, Clone)]
pub enum ForecastModel {
    Sequence(SequenceModel),
    TreeEnsemble(FeedForwardModel),
    Autoregressive(FeedForwardModel),
    Decomposition(FeedForwardModel),
}

impl ForecastModel {
    pub fn from_config(config: ModelConfig) -> Self {
        match config.family {
            ModelFamily::Sequence => ForecastModel::Sequence(SequenceModel { config }),
            ModelFamily::TreeEnsemble => ForecastModel::TreeEnsemble(FeedForwardModel { config }),
            ModelFamily::Autoregressive => {
                ForecastModel::Autoregressive(FeedForwardModel { config })
            }
            ModelFamily::Decomposition => ForecastModel::Decomposition(FeedForwardModel { config }),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        match self {
            ForecastModel::Sequence(m) => &m.config,
            ForecastModel::TreeEnsemble(m)
            | ForecastModel::Autoregressive(m)
            | ForecastModel::Decomposition(m) => &m.config,
        }
    }

    pub fn name(&self) -> &str {
        &self.config().name
    }

    pub fn family(&self) -> ModelFamily {
        self.config().family
    }

    /// Runs the pipeline for this model's family and checks the produced
    /// schema against the registered one.
    pub fn prepare_features<P>(&self, pipeline: &P, dataset: &Dataset) -> EngineResult<PreparedFeatures>
    where
        P: FeaturePipeline + ?Sized,
    {
        let config = self.config();
        let prepared = pipeline.prepare(dataset, config.family, config.horizon_length)?;
        if prepared.metadata.feature_names != config.feature_schema {
            return Err(EngineError::validation(format!(
                "{}: pipeline produced schema {:?}, expected {:?}",
                config.name, prepared.metadata.feature_names, config.feature_schema
            )));
        }
        Ok(prepared)
    }

    pub fn train(&self, prepared: &PreparedFeatures) -> EngineResult<FittedModel> {
        match self {
            ForecastModel::Sequence(m) => m.train(prepared),
            ForecastModel::TreeEnsemble(m)
            | ForecastModel::Autoregressive(m)
            | ForecastModel::Decomposition(m) => m.train(prepared),
        }
    }

    /// Forecasts `horizon_length` steps after the latest prepared sample.
    pub fn infer(&self, fitted: &FittedModel, prepared: &PreparedFeatures) -> EngineResult<Vec<f64>> {
        let latest = prepared.latest().ok_or_else(|| {
            EngineError::insufficient_data(format!("{}: no input to forecast from", self.name()))
        })?;
        let values = fitted.predict(latest)?;
        if values.len() != self.config().horizon_length {
            return Err(EngineError::numeric(format!(
                "{}: expected {} outputs, got {}",
                self.name(),
                self.config().horizon_length,
                values.len()
            )));
        }
        Ok(values)
    }
}
