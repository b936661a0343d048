//! Additive trend + seasonality + regressors, the decomposition analogue.

use forgecast_core::Dataset;

use super::FeatureInput;
use super::calendar::{epoch_days, fourier, holiday_flag, trailing_trend};

pub(crate) const FEATURES: [&str; 11] = [
    "trend_slope",
    "trend_level",
    "weekly_sin",
    "weekly_cos",
    "monthly_sin",
    "monthly_cos",
    "yearly_sin",
    "yearly_cos",
    "holiday",
    "temperature",
    "economic_index",
];

const TREND_WINDOW: usize = 30;
/// Seasonal periods in days. Observations are at most daily, so a 1-day
/// term would be constant.
const PERIODS: [f64; 3] = [7.0, 30.44, 365.25];

/// External regressors read from observation features, zero when absent.
const EXTERNAL: [&str; 2] = ["temperature", "economic_index"];

pub(crate) fn build(dataset: &Dataset) -> Vec<(usize, FeatureInput)> {
    let values = dataset.values();

    dataset
        .iter()
        .enumerate()
        .map(|(t, obs)| {
            let (slope, level) = trailing_trend(&values, t, TREND_WINDOW);
            let days = epoch_days(&obs.timestamp);

            let mut row = vec![slope, level];
            for period in PERIODS {
                row.extend(fourier(days, period, 1));
            }
            row.push(holiday_flag(obs));
            row.extend(EXTERNAL.iter().map(|name| obs.feature(name).unwrap_or(0.0)));
            (t, FeatureInput::Flat(row))
        })
        .collect()
}
