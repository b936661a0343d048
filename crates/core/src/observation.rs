//! Historical series model.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// A single point of the historical series.
///
/// `features` carries named auxiliary signals (seasonality index, promotion
/// flag, external factors). A `BTreeMap` keeps key order stable, which the
/// signature service relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, f64>>,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            features: None,
        }
    }

    pub fn with_feature(mut self, name: impl Into<String>, value: f64) -> Self {
        self.features
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value);
        self
    }

    /// Looks up a named auxiliary signal.
    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.as_ref()?.get(name).copied()
    }

    /// Sorted names of the auxiliary signals present on this observation.
    pub fn feature_names(&self) -> Vec<&str> {
        self.features
            .as_ref()
            .map(|f| f.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

impl ValueObject for Observation {}

/// Ordered sequence of observations; insertion order is chronological order.
///
/// Duplicate timestamps are not rejected: ordering is the caller's contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset(Vec<Observation>);

impl Dataset {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self(observations)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Builds a daily series starting at `start` from plain values.
    pub fn daily(start: DateTime<Utc>, values: impl IntoIterator<Item = f64>) -> Self {
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| Observation::new(start + Duration::days(i as i64), v))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Observation] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.0.last()
    }

    /// The trailing `n` observations (or all of them when shorter).
    pub fn tail(&self, n: usize) -> &[Observation] {
        let start = self.0.len().saturating_sub(n);
        &self.0[start..]
    }

    pub fn values(&self) -> Vec<f64> {
        self.0.iter().map(|o| o.value).collect()
    }

    pub fn into_inner(self) -> Vec<Observation> {
        self.0
    }
}

impl From<Vec<Observation>> for Dataset {
    fn from(value: Vec<Observation>) -> Self {
        Self(value)
    }
}

impl FromIterator<Observation> for Dataset {
    fn from_iter<I: IntoIterator<Item = Observation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl ValueObject for Dataset {}
