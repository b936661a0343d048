//! Sliding windows for the recurrent family.

use forgecast_core::{Dataset, EngineError, EngineResult};

use super::FeatureInput;
use super::calendar::{day_of_week, seasonality, weekend_flag};

pub(crate) const FEATURES: [&str; 5] = ["value", "seasonality", "trend", "day_of_week", "weekend"];

/// One window of `window` step rows per index `t >= window - 1`.
pub(crate) fn build(dataset: &Dataset, window: usize) -> EngineResult<Vec<(usize, FeatureInput)>> {
    let window = window.max(1);
    let n = dataset.len();
    if n < window {
        return Err(EngineError::insufficient_data(format!(
            "sequence window {window} exceeds {n} observations"
        )));
    }

    let span = n.saturating_sub(1).max(1) as f64;
    let rows: Vec<Vec<f64>> = dataset
        .iter()
        .enumerate()
        .map(|(t, obs)| {
            vec![
                obs.value,
                seasonality(obs),
                t as f64 / span,
                day_of_week(&obs.timestamp) / 6.0,
                weekend_flag(&obs.timestamp),
            ]
        })
        .collect();

    Ok((window - 1..n)
        .map(|t| {
            let steps = rows[t + 1 - window..=t].to_vec();
            (t, FeatureInput::Sequence(steps))
        })
        .collect())
}
