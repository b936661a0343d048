use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ensemble::{DEFAULT_CONFIDENCE_LEVEL, normalize_level};

/// Per-request options of a forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastOptions {
    /// Fraction (`0.95`) or percentage (`95`); out-of-range values mean 0.95.
    pub confidence_level: f64,
    /// Overrides the configured forecast TTL for the write-back.
    pub cache_ttl_secs: Option<u64>,
    /// Model-specific flags; part of the cache identity.
    pub flags: BTreeMap<String, String>,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            cache_ttl_secs: None,
            flags: BTreeMap::new(),
        }
    }
}

impl ForecastOptions {
    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    pub fn with_cache_ttl(mut self, ttl_secs: u64) -> Self {
        self.cache_ttl_secs = Some(ttl_secs);
        self
    }

    pub fn with_flag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.flags.insert(name.into(), value.into());
        self
    }

    /// The confidence level as a fraction.
    pub fn level(&self) -> f64 {
        normalize_level(self.confidence_level)
    }

    /// What enters the signature. The TTL override is excluded: it changes
    /// how long a result lives, not what it is.
    pub(crate) fn signature_input(&self, horizon: usize) -> SignatureInput<'_> {
        SignatureInput {
            horizon,
            confidence_level: self.level(),
            flags: &self.flags,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SignatureInput<'a> {
    horizon: usize,
    confidence_level: f64,
    flags: &'a BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use forgecast_core::Dataset;

    use super::*;
    use crate::signature::signature;

    fn dataset() -> Dataset {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Dataset::daily(start, [3.0, 4.0, 5.0])
    }

    #[test]
    fn percentage_and_fraction_are_the_same_request() {
        let a = ForecastOptions::default().with_confidence_level(95.0);
        let b = ForecastOptions::default();
        assert_eq!(
            signature(&dataset(), &a.signature_input(7)),
            signature(&dataset(), &b.signature_input(7))
        );
    }

    #[test]
    fn ttl_does_not_change_identity_but_flags_do() {
        let base = ForecastOptions::default();
        let ttl = base.clone().with_cache_ttl(60);
        let flagged = base.clone().with_flag("promo", "on");

        let sig = |o: &ForecastOptions| signature(&dataset(), &o.signature_input(7));
        assert_eq!(sig(&base), sig(&ttl));
        assert_ne!(sig(&base), sig(&flagged));
        assert_ne!(
            sig(&base),
            signature(&dataset(), &base.signature_input(14))
        );
    }
}
