use std::f64::consts::PI;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use forgecast_core::{Dataset, Observation};

/// Deterministic daily demand-like series of `len` points ending at `end`.
///
/// `100 + 0.5·i + 15·sin(2πi/7) + U(-5, 5)`, floored at zero. The same seed
/// always yields the same series.
pub fn synthetic_dataset(len: usize, end: DateTime<Utc>, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = end - Duration::days(len.saturating_sub(1) as i64);

    (0..len)
        .map(|i| {
            let t = i as f64;
            let noise: f64 = rng.gen_range(-5.0..5.0);
            let value = 100.0 + 0.5 * t + 15.0 * (2.0 * PI * t / 7.0).sin() + noise;
            Observation::new(start + Duration::days(i as i64), value.max(0.0))
        })
        .collect()
}
