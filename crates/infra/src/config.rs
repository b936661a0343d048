//! Environment configuration.
//!
//! Every variable is optional and overrides one default:
//!
//! | variable | effect |
//! |---|---|
//! | `FORGECAST_REDIS_URL` | use Redis instead of the in-memory store |
//! | `FORGECAST_FORECAST_TTL_SECS` | forecast cache lifetime |
//! | `FORGECAST_PERFORMANCE_TTL_SECS` | performance record lifetime |
//! | `FORGECAST_HORIZON` | output length of every model |
//! | `FORGECAST_ALLOW_SYNTHETIC` | substitute synthetic history for short series |
//! | `FORGECAST_CACHE_TIMEOUT_MS` | per-command cache timeout |
//! | `FORGECAST_RETRAIN_INTERVAL_SECS` | background retraining period, `0` disables |
//! | `FORGECAST_ENSEMBLE_WEIGHTS` | `name=weight,...` |

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};

use forgecast_ai::{EngineConfig, EnsembleWeights};

pub const REDIS_URL: &str = "FORGECAST_REDIS_URL";
pub const FORECAST_TTL_SECS: &str = "FORGECAST_FORECAST_TTL_SECS";
pub const PERFORMANCE_TTL_SECS: &str = "FORGECAST_PERFORMANCE_TTL_SECS";
pub const HORIZON: &str = "FORGECAST_HORIZON";
pub const ALLOW_SYNTHETIC: &str = "FORGECAST_ALLOW_SYNTHETIC";
pub const CACHE_TIMEOUT_MS: &str = "FORGECAST_CACHE_TIMEOUT_MS";
pub const RETRAIN_INTERVAL_SECS: &str = "FORGECAST_RETRAIN_INTERVAL_SECS";
pub const ENSEMBLE_WEIGHTS: &str = "FORGECAST_ENSEMBLE_WEIGHTS";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub engine: EngineConfig,
    pub redis_url: Option<String>,
    pub cache_timeout: Duration,
    /// `None` disables the background retraining runner.
    pub retrain_interval: Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            redis_url: None,
            cache_timeout: Duration::from_millis(500),
            retrain_interval: None,
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`EngineSettings::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        let lookup = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        settings.redis_url = lookup(REDIS_URL);

        if let Some(secs) = parse::<u64>(&lookup, FORECAST_TTL_SECS)? {
            settings.engine.ttl.forecast_secs = secs;
        }
        if let Some(secs) = parse::<u64>(&lookup, PERFORMANCE_TTL_SECS)? {
            settings.engine.ttl.performance_secs = secs;
        }
        if let Some(horizon) = parse::<usize>(&lookup, HORIZON)? {
            if horizon == 0 {
                bail!("{HORIZON} must be positive");
            }
            settings.engine.horizon_length = horizon;
        }
        if let Some(raw) = lookup(ALLOW_SYNTHETIC) {
            settings.engine.allow_synthetic = parse_flag(&raw)
                .with_context(|| format!("invalid {ALLOW_SYNTHETIC}: {raw:?}"))?;
        }
        if let Some(ms) = parse::<u64>(&lookup, CACHE_TIMEOUT_MS)? {
            settings.cache_timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(secs) = parse::<u64>(&lookup, RETRAIN_INTERVAL_SECS)? {
            settings.retrain_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(raw) = lookup(ENSEMBLE_WEIGHTS) {
            settings.engine.default_weights = parse_weights(&raw)
                .with_context(|| format!("invalid {ENSEMBLE_WEIGHTS}: {raw:?}"))?;
        }

        Ok(settings)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(name)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("invalid {name}: {raw:?}"))
        })
        .transpose()
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("expected a boolean"),
    }
}

/// `sequence=0.4,tree_ensemble=0.6`, validated as ensemble weights.
fn parse_weights(raw: &str) -> anyhow::Result<BTreeMap<String, f64>> {
    let mut weights = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((name, weight)) = pair.split_once('=') else {
            bail!("expected name=weight, got {pair:?}");
        };
        let weight: f64 = weight
            .trim()
            .parse()
            .with_context(|| format!("weight of {name:?}"))?;
        weights.insert(name.trim().to_string(), weight);
    }
    let validated = EnsembleWeights::new(weights)?;
    Ok(validated.as_map().clone())
}
