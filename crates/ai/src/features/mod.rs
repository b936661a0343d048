//! Feature preparation.
//!
//! A [`FeaturePipeline`] turns a raw [`Dataset`] into the numeric inputs and
//! horizon targets of one model family. It owns only the transform; fitting
//! and inference belong to [`crate::model`].
//!
//! Every family produces one sample per usable index `t` of the series, the
//! sample describing the state "as of" observation `t`. Its target is the
//! next `horizon` values, so only samples with a full horizon ahead are used
//! for training, and the last sample is the one inference forecasts from.

mod autoregressive;
mod calendar;
mod decomposition;
mod sequence;
mod synthetic;
mod tabular;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use forgecast_core::{Dataset, EngineError, EngineResult};

use crate::config::EngineConfig;
use crate::model::{InputShape, ModelFamily};

pub use synthetic::synthetic_dataset;

/// Whether a result was derived from caller data or from the generated
/// stand-in series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Observed,
    Synthetic,
}

impl DataSource {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, DataSource::Synthetic)
    }
}

/// One model input.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureInput {
    Flat(Vec<f64>),
    Sequence(Vec<Vec<f64>>),
}

impl FeatureInput {
    pub fn as_flat(&self) -> Option<&[f64]> {
        match self {
            FeatureInput::Flat(v) => Some(v),
            FeatureInput::Sequence(_) => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Vec<f64>]> {
        match self {
            FeatureInput::Sequence(s) => Some(s),
            FeatureInput::Flat(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMetadata {
    pub family: ModelFamily,
    pub data_source: DataSource,
    pub feature_names: Vec<String>,
    pub input_shape: InputShape,
    /// All samples, including those without a full horizon ahead.
    pub sample_count: usize,
    /// Samples with a complete target vector.
    pub training_samples: usize,
    /// Length of the caller's dataset before any substitution.
    pub original_length: usize,
}

/// Output of [`FeaturePipeline::prepare`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedFeatures {
    /// Chronological samples; the last one is the inference input.
    pub samples: Vec<FeatureInput>,
    /// `targets[i]` belongs to `samples[i]`; shorter than `samples` by the
    /// trailing samples that have no full horizon ahead.
    pub targets: Vec<Vec<f64>>,
    /// Values of the series the samples were built from.
    pub history: Vec<f64>,
    pub metadata: FeatureMetadata,
}

impl PreparedFeatures {
    pub fn training_pairs(&self) -> impl Iterator<Item = (&FeatureInput, &[f64])> {
        self.samples
            .iter()
            .zip(&self.targets)
            .map(|(s, t)| (s, t.as_slice()))
    }

    pub fn latest(&self) -> Option<&FeatureInput> {
        self.samples.last()
    }

    pub fn is_synthetic(&self) -> bool {
        self.metadata.data_source.is_synthetic()
    }
}

pub trait FeaturePipeline: Send + Sync {
    fn prepare(
        &self,
        dataset: &Dataset,
        family: ModelFamily,
        horizon: usize,
    ) -> EngineResult<PreparedFeatures>;
}

/// Feature names produced for `family`, in column order.
pub fn feature_names(family: ModelFamily) -> Vec<String> {
    let names: &[&str] = match family {
        ModelFamily::Sequence => &sequence::FEATURES,
        ModelFamily::TreeEnsemble => &tabular::FEATURES,
        ModelFamily::Autoregressive => &autoregressive::FEATURES,
        ModelFamily::Decomposition => &decomposition::FEATURES,
    };
    names.iter().map(|n| n.to_string()).collect()
}

/// The built-in pipeline.
///
/// Datasets shorter than `min_history` are replaced by
/// [`synthetic_dataset`] ending at the last observed timestamp, and the
/// output is marked [`DataSource::Synthetic`]. With `allow_synthetic` off
/// they fail with [`EngineError::InsufficientData`] instead.
#[derive(Debug, Clone)]
pub struct StandardPipeline {
    pub min_history: usize,
    pub sequence_window: usize,
    pub synthetic_length: usize,
    pub allow_synthetic: bool,
    pub synthetic_seed: u64,
}

impl StandardPipeline {
    pub const SYNTHETIC_SEED: u64 = 42;

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            min_history: config.min_history,
            sequence_window: config.sequence_window,
            synthetic_length: config.synthetic_length,
            allow_synthetic: config.allow_synthetic,
            synthetic_seed: Self::SYNTHETIC_SEED,
        }
    }

    fn fallback_end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default()
    }

    /// Returns the series to build from, substituting when too short.
    fn source_series(&self, dataset: &Dataset) -> EngineResult<(Dataset, DataSource)> {
        if dataset.len() >= self.min_history.max(1) {
            return Ok((dataset.clone(), DataSource::Observed));
        }
        if !self.allow_synthetic {
            return Err(EngineError::insufficient_data(format!(
                "{} observations, at least {} required",
                dataset.len(),
                self.min_history
            )));
        }

        warn!(
            observed = dataset.len(),
            min_history = self.min_history,
            synthetic_length = self.synthetic_length,
            "history too short, substituting synthetic series"
        );
        let end = dataset
            .last()
            .map(|o| o.timestamp)
            .unwrap_or_else(Self::fallback_end);
        let length = self.synthetic_length.max(self.min_history);
        Ok((
            synthetic_dataset(length, end, self.synthetic_seed),
            DataSource::Synthetic,
        ))
    }
}

impl Default for StandardPipeline {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl FeaturePipeline for StandardPipeline {
    fn prepare(
        &self,
        dataset: &Dataset,
        family: ModelFamily,
        horizon: usize,
    ) -> EngineResult<PreparedFeatures> {
        let (series, data_source) = self.source_series(dataset)?;

        let indexed = match family {
            ModelFamily::Sequence => sequence::build(&series, self.sequence_window)?,
            ModelFamily::TreeEnsemble => tabular::build(&series),
            ModelFamily::Autoregressive => autoregressive::build(&series),
            ModelFamily::Decomposition => decomposition::build(&series),
        };
        if indexed.is_empty() {
            return Err(EngineError::insufficient_data(format!(
                "{family}: no samples from {} observations",
                series.len()
            )));
        }

        let history = series.values();
        let n = history.len();
        let targets: Vec<Vec<f64>> = indexed
            .iter()
            .map_while(|(t, _)| {
                let end = t + 1 + horizon;
                (end <= n).then(|| history[t + 1..end].to_vec())
            })
            .collect();

        let feature_names = feature_names(family);
        let input_shape = if family.is_sequence() {
            InputShape::Sequence {
                window: self.sequence_window.max(1),
                features: feature_names.len(),
            }
        } else {
            InputShape::Flat {
                features: feature_names.len(),
            }
        };

        let metadata = FeatureMetadata {
            family,
            data_source,
            feature_names,
            input_shape,
            sample_count: indexed.len(),
            training_samples: targets.len(),
            original_length: dataset.len(),
        };

        Ok(PreparedFeatures {
            samples: indexed.into_iter().map(|(_, input)| input).collect(),
            targets,
            history,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn short_history_is_replaced_and_flagged() {
        let pipeline = StandardPipeline::default();
        let short = Dataset::daily(end(), [5.0, 6.0, 7.0]);

        let prepared = pipeline
            .prepare(&short, ModelFamily::TreeEnsemble, 7)
            .unwrap();
        assert!(prepared.is_synthetic());
        assert_eq!(prepared.metadata.original_length, 3);
        assert_eq!(prepared.history.len(), pipeline.synthetic_length);
    }

    #[test]
    fn short_history_fails_when_synthetic_disabled() {
        let pipeline = StandardPipeline {
            allow_synthetic: false,
            ..StandardPipeline::default()
        };
        let err = pipeline
            .prepare(&Dataset::empty(), ModelFamily::Autoregressive, 7)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));
    }

    #[test]
    fn targets_are_the_next_horizon_values() {
        let pipeline = StandardPipeline::default();
        let ds = synthetic_dataset(40, end(), 1);
        let prepared = pipeline.prepare(&ds, ModelFamily::TreeEnsemble, 7).unwrap();

        assert_eq!(prepared.metadata.data_source, DataSource::Observed);
        assert_eq!(prepared.samples.len(), 40);
        assert_eq!(prepared.targets.len(), 33);
        assert_eq!(prepared.targets[0], ds.values()[1..8].to_vec());
    }

    #[test]
    fn every_family_matches_its_schema() {
        let pipeline = StandardPipeline::default();
        let ds = synthetic_dataset(60, end(), 2);
        for family in ModelFamily::ALL {
            let prepared = pipeline.prepare(&ds, family, 7).unwrap();
            let width = prepared.metadata.input_shape.feature_width();
            assert_eq!(width, feature_names(family).len(), "{family}");
            match prepared.latest().unwrap() {
                FeatureInput::Flat(x) => assert_eq!(x.len(), width),
                FeatureInput::Sequence(s) => {
                    assert_eq!(s.len(), pipeline.sequence_window);
                    assert!(s.iter().all(|step| step.len() == width));
                }
            }
            assert!(prepared.metadata.training_samples > 0, "{family}");
        }
    }
}
