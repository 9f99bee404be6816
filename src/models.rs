use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::{GatewayError, Result};

/// Labels identifying one time series, as produced by the backend.
pub type LabelSet = HashMap<String, String>;

/// One instant-query point for a single series. Timestamp and value keep the
/// backend's native representation (seconds, float).
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: LabelSet,
    pub timestamp: f64,
    pub value: f64,
}

/// One (timestamp, value) pair inside a range-query series.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePair {
    pub timestamp: f64,
    pub value: f64,
}

/// One range-query series. `values` preserves the chronological order of the
/// backend response.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleStream {
    pub metric: LabelSet,
    pub values: Vec<SamplePair>,
}

/// Backend query result, tagged by the wire `resultType` so downstream code
/// never needs runtime type assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Vector(Vec<Sample>),
    Matrix(Vec<SampleStream>),
    Scalar(SamplePair),
    Str { timestamp: f64, value: String },
}

impl QueryValue {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryValue::Vector(_) => "vector",
            QueryValue::Matrix(_) => "matrix",
            QueryValue::Scalar(_) => "scalar",
            QueryValue::Str { .. } => "string",
        }
    }
}

/// Evaluation window for a range query. Invariant: `start < end`, `step > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl TimeWindow {
    /// Build the trailing window `[now - history, now]` with the given step.
    pub fn trailing(
        step_minutes: i64,
        history_minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if step_minutes <= 0 {
            return Err(GatewayError::Query(format!(
                "step must be positive, got {}m",
                step_minutes
            )));
        }
        if history_minutes <= 0 {
            return Err(GatewayError::Query(format!(
                "history must be positive, got {}m",
                history_minutes
            )));
        }
        Ok(Self {
            start: now - Duration::minutes(history_minutes),
            end: now,
            step: Duration::minutes(step_minutes),
        })
    }
}

/// Scrape target the backend is actively collecting.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTarget {
    #[serde(default)]
    pub discovered_labels: LabelSet,
    #[serde(default)]
    pub labels: LabelSet,
    #[serde(default)]
    pub scrape_pool: String,
    #[serde(default)]
    pub scrape_url: String,
    #[serde(default)]
    pub last_error: String,
    #[serde(default)]
    pub health: String,
}

/// Target the backend discovered but dropped before scraping.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedTarget {
    #[serde(default)]
    pub discovered_labels: LabelSet,
}

/// Active and dropped targets as reported by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetsSnapshot {
    #[serde(default)]
    pub active_targets: Vec<ActiveTarget>,
    #[serde(default)]
    pub dropped_targets: Vec<DroppedTarget>,
}
