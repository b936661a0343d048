//! Weighted ensemble combination and the inter-model confidence band.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use forgecast_core::{EngineError, EngineResult};

/// Accepted deviation of the weight sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-3;

/// Model name to ensemble weight, each in `[0, 1]`, summing to 1.
///
/// Weights express configured trust in a model family; they are never
/// derived from runtime accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct EnsembleWeights(BTreeMap<String, f64>);

impl EnsembleWeights {
    pub fn new(weights: BTreeMap<String, f64>) -> EngineResult<Self> {
        if weights.is_empty() {
            return Err(EngineError::invalid_weights("no weights given"));
        }
        for (name, w) in &weights {
            if !w.is_finite() || !(0.0..=1.0).contains(w) {
                return Err(EngineError::invalid_weights(format!(
                    "{name}: {w} is outside [0, 1]"
                )));
            }
        }
        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::invalid_weights(format!(
                "weights sum to {sum}, expected 1.0"
            )));
        }
        Ok(Self(weights))
    }

    /// Rejects names outside `known`.
    pub fn ensure_known<'a>(&self, known: impl IntoIterator<Item = &'a str>) -> EngineResult<()> {
        let known: Vec<&str> = known.into_iter().collect();
        match self.0.keys().find(|name| !known.contains(&name.as_str())) {
            Some(unknown) => Err(EngineError::invalid_weights(format!(
                "unknown model: {unknown}"
            ))),
            None => Ok(()),
        }
    }

    /// Weight of `name`, zero when unweighted.
    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.0
    }
}

impl TryFrom<BTreeMap<String, f64>> for EnsembleWeights {
    type Error = EngineError;

    fn try_from(value: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EnsembleWeights> for BTreeMap<String, f64> {
    fn from(value: EnsembleWeights) -> Self {
        value.0
    }
}

pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Accepts fractions (`0.95`) and percentages (`95`). Anything that does not
/// land strictly inside (0, 1) reads as the default level.
pub fn normalize_level(level: f64) -> f64 {
    let level = if level > 1.0 { level / 100.0 } else { level };
    if level.is_finite() && level > 0.0 && level < 1.0 {
        level
    } else {
        DEFAULT_CONFIDENCE_LEVEL
    }
}

/// Two-sided z-score for a confidence level; unrecognized levels get 1.96.
pub fn z_score(level: f64) -> f64 {
    let level = normalize_level(level);
    const TABLE: [(f64, f64); 3] = [(0.90, 1.645), (0.95, 1.96), (0.99, 2.576)];
    TABLE
        .iter()
        .find(|(l, _)| (l - level).abs() < 1e-9)
        .map(|(_, z)| *z)
        .unwrap_or(1.96)
}

/// Ensemble forecast with its band.
#[derive(Debug, Clone, PartialEq)]
pub struct Combined {
    pub ensemble: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Combines per-model forecasts step by step.
///
/// `ensemble[i] = Σ w·f[i] / Σ w` over the given models, a plain mean when
/// their weights sum to zero, floored at zero. The margin is the population
/// standard deviation across models times the z-score; the lower bound is
/// floored at zero. Missing steps in a shorter forecast are skipped.
pub fn combine<'a>(
    forecasts: impl IntoIterator<Item = (&'a str, &'a [f64])>,
    weights: &EnsembleWeights,
    horizon: usize,
    confidence_level: f64,
) -> Combined {
    let forecasts: Vec<(&[f64], f64)> = forecasts
        .into_iter()
        .map(|(name, values)| (values, weights.get(name)))
        .collect();
    let z = z_score(confidence_level);

    let mut ensemble = Vec::with_capacity(horizon);
    let mut upper = Vec::with_capacity(horizon);
    let mut lower = Vec::with_capacity(horizon);

    for i in 0..horizon {
        let step: Vec<(f64, f64)> = forecasts
            .iter()
            .filter_map(|(values, w)| values.get(i).map(|v| (*v, *w)))
            .filter(|(v, _)| v.is_finite())
            .collect();

        let center = weighted_mean(&step).max(0.0);
        let margin = z * population_std(&step);
        let margin = if margin.is_finite() { margin } else { 0.0 };

        ensemble.push(center);
        upper.push(center + margin);
        lower.push((center - margin).max(0.0));
    }

    Combined {
        ensemble,
        upper,
        lower,
    }
}

fn weighted_mean(step: &[(f64, f64)]) -> f64 {
    if step.is_empty() {
        return 0.0;
    }
    let total_weight: f64 = step.iter().map(|(_, w)| w).sum();
    let value = if total_weight > 0.0 {
        step.iter().map(|(v, w)| v * w).sum::<f64>() / total_weight
    } else {
        step.iter().map(|(v, _)| v).sum::<f64>() / step.len() as f64
    };
    if value.is_finite() { value } else { 0.0 }
}

fn population_std(step: &[(f64, f64)]) -> f64 {
    if step.len() < 2 {
        return 0.0;
    }
    let n = step.len() as f64;
    let mean = step.iter().map(|(v, _)| v).sum::<f64>() / n;
    let var = step.iter().map(|(v, _)| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}
