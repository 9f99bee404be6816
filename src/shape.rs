//! Pure transforms from the intermediate record shapes to the externally
//! documented output shapes. Nothing here mutates its input or talks to the
//! backend.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{LabelSet, Sample, SamplePair, SampleStream, TargetsSnapshot};

/// Instant sample in the external output shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapedSample {
    pub metric: BTreeMap<String, String>,
    pub timestamp: i64,
    pub value: f64,
}

/// One point of a shaped range series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapedPoint {
    pub timestamp: i64,
    pub value: f64,
}

/// Range series in the external output shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapedSeries {
    pub metric: BTreeMap<String, String>,
    pub values: Vec<ShapedPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapedActiveTarget {
    pub discovered_labels: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub scrape_pool: String,
    pub scrape_url: String,
    pub last_error: String,
    pub health: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapedDroppedTarget {
    pub discovered_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapedTargets {
    pub active_targets: Vec<ShapedActiveTarget>,
    pub dropped_targets: Vec<ShapedDroppedTarget>,
}

/// Copy a label set into a sorted string map.
pub fn label_map(labels: &LabelSet) -> BTreeMap<String, String> {
    labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub fn sample(s: &Sample) -> ShapedSample {
    ShapedSample {
        metric: label_map(&s.metric),
        timestamp: s.timestamp as i64,
        value: s.value,
    }
}

pub fn samples(list: &[Sample]) -> Vec<ShapedSample> {
    list.iter().map(sample).collect()
}

pub fn point(p: &SamplePair) -> ShapedPoint {
    ShapedPoint {
        timestamp: p.timestamp as i64,
        value: p.value,
    }
}

pub fn sample_stream(s: &SampleStream) -> ShapedSeries {
    ShapedSeries {
        metric: label_map(&s.metric),
        values: s.values.iter().map(point).collect(),
    }
}

pub fn sample_streams(list: &[SampleStream]) -> Vec<ShapedSeries> {
    list.iter().map(sample_stream).collect()
}

pub fn label_sets(list: &[LabelSet]) -> Vec<BTreeMap<String, String>> {
    list.iter().map(label_map).collect()
}

pub fn targets(snapshot: &TargetsSnapshot) -> ShapedTargets {
    ShapedTargets {
        active_targets: snapshot
            .active_targets
            .iter()
            .map(|t| ShapedActiveTarget {
                discovered_labels: label_map(&t.discovered_labels),
                labels: label_map(&t.labels),
                scrape_pool: t.scrape_pool.clone(),
                scrape_url: t.scrape_url.clone(),
                last_error: t.last_error.clone(),
                health: t.health.clone(),
            })
            .collect(),
        dropped_targets: snapshot
            .dropped_targets
            .iter()
            .map(|t| ShapedDroppedTarget {
                discovered_labels: label_map(&t.discovered_labels),
            })
            .collect(),
    }
}
