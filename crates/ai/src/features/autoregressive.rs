//! Lags, short moving averages and weekly Fourier terms.

use forgecast_core::Dataset;

use super::FeatureInput;
use super::calendar::{epoch_days, fourier, trailing_mean};

pub(crate) const FEATURES: [&str; 8] = [
    "lag_1",
    "lag_2",
    "ma_3",
    "ma_7",
    "weekly_sin_1",
    "weekly_cos_1",
    "weekly_sin_2",
    "weekly_cos_2",
];

const WEEK: f64 = 7.0;
const FOURIER_ORDER: usize = 2;

/// One row per index `t >= 1`; `lag_1` is the value at `t` itself.
pub(crate) fn build(dataset: &Dataset) -> Vec<(usize, FeatureInput)> {
    let values = dataset.values();

    dataset
        .iter()
        .enumerate()
        .skip(1)
        .map(|(t, obs)| {
            let mut row = vec![
                values[t],
                values[t - 1],
                trailing_mean(&values, t, 3),
                trailing_mean(&values, t, 7),
            ];
            row.extend(fourier(epoch_days(&obs.timestamp), WEEK, FOURIER_ORDER));
            (t, FeatureInput::Flat(row))
        })
        .collect()
}
