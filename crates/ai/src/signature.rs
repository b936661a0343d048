//! Dataset signatures (cache key namespace).
//!
//! A signature fingerprints the *recent shape* of a series plus the request
//! options: only the trailing `points` observations are hashed, together with
//! the full dataset length. Two datasets that share their recent history and
//! length deliberately map to the same signature, so they share cache
//! entries. This is a locality trade-off, not full content addressing.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use forgecast_core::{Dataset, ValueObject};

use crate::config::EngineConfig;

/// Signature of a dataset with no observations.
pub const EMPTY_SIGNATURE: &str = "empty";

/// Signature used when the request options cannot be serialized.
pub const UNKNOWN_SIGNATURE: &str = "unknown";

/// Short, deterministic fingerprint of a dataset + request options.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetSignature(String);

impl DatasetSignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_sentinel(&self) -> bool {
        self.0 == EMPTY_SIGNATURE || self.0 == UNKNOWN_SIGNATURE
    }

    fn sentinel(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl core::fmt::Display for DatasetSignature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValueObject for DatasetSignature {}

/// Projection of an observation that enters the hash: feature *names* only,
/// magnitudes are ignored.
#[derive(Serialize)]
struct ProjectedPoint<'a> {
    value: f64,
    timestamp: String,
    features: Vec<&'a str>,
}

/// Computes [`DatasetSignature`]s. Pure: no clock, no IO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureService {
    points: usize,
    length: usize,
}

impl Default for SignatureService {
    fn default() -> Self {
        Self::new(10, 16)
    }
}

impl SignatureService {
    pub fn new(points: usize, length: usize) -> Self {
        Self {
            points: points.max(1),
            length: length.clamp(1, 64),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.signature_points, config.signature_length)
    }

    pub fn signature<O>(&self, dataset: &Dataset, options: &O) -> DatasetSignature
    where
        O: Serialize + ?Sized,
    {
        if dataset.is_empty() {
            return DatasetSignature::sentinel(EMPTY_SIGNATURE);
        }

        let projected: Vec<ProjectedPoint<'_>> = dataset
            .tail(self.points)
            .iter()
            .map(|o| ProjectedPoint {
                value: o.value,
                timestamp: o.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                features: o.feature_names(),
            })
            .collect();

        let (Ok(points_json), Ok(options_json)) =
            (serde_json::to_string(&projected), serde_json::to_string(options))
        else {
            return DatasetSignature::sentinel(UNKNOWN_SIGNATURE);
        };

        let data_hash = sha256_hex(points_json.as_bytes());
        let combined = format!("{}|{}|{}", dataset.len(), data_hash, options_json);
        let mut digest = sha256_hex(combined.as_bytes());
        digest.truncate(self.length);

        DatasetSignature(digest)
    }
}

/// Signature with the default service (10 trailing points, 16 hex chars).
pub fn signature<O>(dataset: &Dataset, options: &O) -> DatasetSignature
where
    O: Serialize + ?Sized,
{
    SignatureService::default().signature(dataset, options)
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
