//! Engine configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::ModelFamily;

/// Cache lifetimes, in whole seconds.
///
/// Forecasts are short-lived because their key changes whenever the input
/// shape changes; performance records and artifacts are only invalidated by
/// retraining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    pub forecast_secs: u64,
    pub performance_secs: u64,
    pub artifact_secs: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            forecast_secs: 30 * 60,
            performance_secs: 24 * 60 * 60,
            artifact_secs: 24 * 60 * 60,
        }
    }
}

/// Tunables of a [`crate::ForecastEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output length of every registered model.
    pub horizon_length: usize,
    /// Below this many observations the pipeline substitutes synthetic data.
    pub min_history: usize,
    /// Window length of the sequence model.
    pub sequence_window: usize,
    /// Length of the generated synthetic series.
    pub synthetic_length: usize,
    /// When false, short datasets fail feature preparation instead of being
    /// replaced (the per-model fallback still answers).
    pub allow_synthetic: bool,
    /// Trailing observations that enter the dataset signature.
    pub signature_points: usize,
    /// Hex characters kept from the signature digest.
    pub signature_length: usize,
    /// Trailing window of the moving-average fallback forecast.
    pub fallback_window: usize,
    pub default_confidence_level: f64,
    pub max_horizon: usize,
    pub ttl: CacheTtls,
    pub default_weights: BTreeMap<String, f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let default_weights = [
            (ModelFamily::Sequence, 0.3),
            (ModelFamily::TreeEnsemble, 0.3),
            (ModelFamily::Autoregressive, 0.2),
            (ModelFamily::Decomposition, 0.2),
        ]
        .into_iter()
        .map(|(family, w)| (family.default_name().to_string(), w))
        .collect();

        Self {
            horizon_length: 7,
            min_history: 30,
            sequence_window: 30,
            synthetic_length: 180,
            allow_synthetic: true,
            signature_points: 10,
            signature_length: 16,
            fallback_window: 7,
            default_confidence_level: 0.95,
            max_horizon: 365,
            ttl: CacheTtls::default(),
            default_weights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_cover_every_family_and_sum_to_one() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.default_weights.len(), ModelFamily::ALL.len());
        let sum: f64 = cfg.default_weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"horizon_length": 14}"#).unwrap();
        assert_eq!(cfg.horizon_length, 14);
        assert_eq!(cfg.min_history, 30);
        assert_eq!(cfg.ttl.forecast_secs, 1800);
    }
}
