//! Per-observation flat vectors for the tree-ensemble analogue.

use forgecast_core::Dataset;

use super::FeatureInput;
use super::calendar::{day_of_week, seasonality, trailing_mean, weekend_flag};

pub(crate) const FEATURES: [&str; 8] = [
    "value",
    "seasonality",
    "trend",
    "day_of_week",
    "weekend",
    "promotion",
    "ma_7",
    "ma_30",
];

pub(crate) fn build(dataset: &Dataset) -> Vec<(usize, FeatureInput)> {
    let values = dataset.values();
    let span = values.len().saturating_sub(1).max(1) as f64;

    dataset
        .iter()
        .enumerate()
        .map(|(t, obs)| {
            let row = vec![
                obs.value,
                seasonality(obs),
                t as f64 / span,
                day_of_week(&obs.timestamp),
                weekend_flag(&obs.timestamp),
                obs.feature("promotion").unwrap_or(0.0),
                trailing_mean(&values, t, 7),
                trailing_mean(&values, t, 30),
            ];
            (t, FeatureInput::Flat(row))
        })
        .collect()
}
