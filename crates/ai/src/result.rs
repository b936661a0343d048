use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forgecast_core::ValueObject;

use crate::features::DataSource;
use crate::model::{InputShape, ModelFamily};
use crate::signature::DatasetSignature;

/// Evaluation of a fitted model on its own training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub mse: f64,
    pub mae: f64,
    /// `None` when the targets have no variance (R² undefined).
    pub r2: Option<f64>,
    /// In \[0, 1\], derived from the RMSE relative to the mean target magnitude.
    pub accuracy_estimate: f64,
    pub last_trained: DateTime<Utc>,
    pub sample_count: usize,
}

/// Where a per-model forecast came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastSource {
    Model,
    /// Trailing moving average substituted after an inference failure.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelForecast {
    pub values: Vec<f64>,
    pub source: ForecastSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelForecast {
    pub fn model(values: Vec<f64>) -> Self {
        Self {
            values,
            source: ForecastSource::Model,
            error: None,
        }
    }

    pub fn fallback(values: Vec<f64>, error: impl Into<String>) -> Self {
        Self {
            values,
            source: ForecastSource::Fallback,
            error: Some(error.into()),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == ForecastSource::Fallback
    }
}

/// Ensemble forecast with confidence band.
///
/// Immutable once produced; a newer result for the same key supersedes it
/// when the cache entry expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub signature: DatasetSignature,
    pub horizon: usize,
    pub per_model_forecasts: BTreeMap<String, ModelForecast>,
    pub ensemble_forecast: Vec<f64>,
    pub confidence_upper: Vec<f64>,
    pub confidence_lower: Vec<f64>,
    pub confidence_level: f64,
    /// `Synthetic` when the input was too short and generated data was used.
    pub data_source: DataSource,
    pub generated_at: DateTime<Utc>,
}

impl ForecastResult {
    pub fn fallback_count(&self) -> usize {
        self.per_model_forecasts
            .values()
            .filter(|f| f.is_fallback())
            .count()
    }
}

impl ValueObject for ForecastResult {}

/// Feature metadata recorded after training.
///
/// Fitted parameters stay process-local; this record only describes how the
/// model was trained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model: String,
    pub family: ModelFamily,
    pub run_id: Uuid,
    pub feature_names: Vec<String>,
    pub input_shape: InputShape,
    pub horizon_length: usize,
    pub sample_count: usize,
    pub data_source: DataSource,
    pub trained_at: DateTime<Utc>,
}
