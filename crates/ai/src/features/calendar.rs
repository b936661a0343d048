//! Calendar and rolling-window helpers shared by the family builders.

use std::f64::consts::PI;

use chrono::{DateTime, Datelike, Utc};

use forgecast_core::Observation;

const SECONDS_PER_DAY: f64 = 86_400.0;
const DAYS_PER_YEAR: f64 = 365.25;

/// Fixed-date holidays (month, day) used when no `holiday` feature is given.
const FIXED_HOLIDAYS: [(u32, u32); 4] = [(1, 1), (7, 4), (12, 25), (12, 31)];

/// Monday = 0 .. Sunday = 6.
pub(crate) fn day_of_week(ts: &DateTime<Utc>) -> f64 {
    f64::from(ts.weekday().num_days_from_monday())
}

pub(crate) fn weekend_flag(ts: &DateTime<Utc>) -> f64 {
    if ts.weekday().num_days_from_monday() >= 5 {
        1.0
    } else {
        0.0
    }
}

/// Days since the Unix epoch, fractional.
pub(crate) fn epoch_days(ts: &DateTime<Utc>) -> f64 {
    ts.timestamp() as f64 / SECONDS_PER_DAY
}

/// The `seasonality` feature when present, otherwise a yearly sinusoid.
pub(crate) fn seasonality(obs: &Observation) -> f64 {
    obs.feature("seasonality").unwrap_or_else(|| {
        let doy = f64::from(obs.timestamp.ordinal());
        (2.0 * PI * doy / DAYS_PER_YEAR).sin()
    })
}

pub(crate) fn holiday_flag(obs: &Observation) -> f64 {
    if let Some(flag) = obs.feature("holiday") {
        return if flag != 0.0 { 1.0 } else { 0.0 };
    }
    let date = (obs.timestamp.month(), obs.timestamp.day());
    if FIXED_HOLIDAYS.contains(&date) { 1.0 } else { 0.0 }
}

/// `[sin(2πkt/p), cos(2πkt/p)]` for `k = 1..=order`.
pub(crate) fn fourier(t: f64, period: f64, order: usize) -> Vec<f64> {
    (1..=order)
        .flat_map(|k| {
            let angle = 2.0 * PI * k as f64 * t / period;
            [angle.sin(), angle.cos()]
        })
        .collect()
}

/// Mean of the `window` values ending at index `t` (shorter at the start).
pub(crate) fn trailing_mean(values: &[f64], t: usize, window: usize) -> f64 {
    let end = (t + 1).min(values.len());
    let start = end.saturating_sub(window.max(1));
    let slice = &values[start..end];
    if slice.is_empty() {
        0.0
    } else {
        slice.iter().sum::<f64>() / slice.len() as f64
    }
}

/// Least-squares line over the `window` values ending at `t`.
///
/// Returns `(slope, level)` where `level` is the fitted value at `t`. A single
/// point has zero slope.
pub(crate) fn trailing_trend(values: &[f64], t: usize, window: usize) -> (f64, f64) {
    let end = (t + 1).min(values.len());
    let start = end.saturating_sub(window.max(1));
    let slice = &values[start..end];
    let n = slice.len() as f64;
    if slice.len() < 2 {
        return (0.0, slice.first().copied().unwrap_or(0.0));
    }

    let mean_x = (n - 1.0) / 2.0;
    let mean_y = slice.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, y) in slice.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    let level = mean_y + slope * (n - 1.0 - mean_x);
    (slope, level)
}
