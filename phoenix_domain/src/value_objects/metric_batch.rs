//! The metric data model the pipeline passes between stages: a tree of
//! resource -> scope -> metric -> data-point, per the neutral interface
//! assumed by the component design.

use crate::value_objects::priority_level::PriorityLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The type tag carried by every `Metric`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricType {
    Gauge,
    CumulativeSum,
    DeltaSum,
    Histogram,
}

/// A single numeric observation: integer or double, never both.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericValue {
    Int(i64),
    Double(f64),
}

impl NumericValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Double(v) => *v,
        }
    }
}

/// One bucketed observation within a histogram metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub upper_bound: f64,
    pub count: u64,
}

/// A single histogram value: total count, total sum, and explicit buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramValue {
    pub count: u64,
    pub sum: f64,
    pub buckets: Vec<HistogramBucket>,
}

/// One data point within a `Metric`'s series: a timestamp, a value, and its
/// own attribute map (independent of the owning resource's attributes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp_unix_nanos: i64,
    pub value: DataPointValue,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataPointValue {
    Number(NumericValue),
    Histogram(HistogramValue),
}

/// A named series of data points sharing one `MetricType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub metric_type: MetricType,
    pub data_points: Vec<DataPoint>,
}

/// A single resource (e.g. one process) carrying resource-level attributes
/// and the metrics reported for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub attributes: HashMap<String, String>,
    pub metrics: Vec<Metric>,
}

impl ResourceMetrics {
    /// Reads the `phoenix.priority` attribute set by `PriorityTagger`, if any.
    pub fn priority(&self) -> Option<PriorityLevel> {
        self.attributes
            .get("phoenix.priority")
            .and_then(|s| s.parse().ok())
    }

    /// Sets `phoenix.priority`. Per the data model invariant, a priority once
    /// set is retained downstream — this only ever widens the attribute map,
    /// it never clears an existing value unless the caller passes the same
    /// key again (which is the intended "first match wins" overwrite inside
    /// `PriorityTagger` itself, before the resource leaves that stage).
    pub fn set_priority(&mut self, level: PriorityLevel) {
        self.attributes
            .insert("phoenix.priority".to_string(), level.to_string());
    }
}

/// An ordered sequence of `ResourceMetrics`, owned by whichever processor is
/// currently consuming it. Ownership transfers to the next stage on
/// successful handoff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricBatch {
    pub resources: Vec<ResourceMetrics>,
}

impl MetricBatch {
    pub fn new(resources: Vec<ResourceMetrics>) -> Self {
        Self { resources }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_round_trips_through_attributes() {
        let mut rm = ResourceMetrics {
            attributes: HashMap::new(),
            metrics: Vec::new(),
        };
        assert_eq!(rm.priority(), None);
        rm.set_priority(PriorityLevel::Critical);
        assert_eq!(rm.priority(), Some(PriorityLevel::Critical));
    }

    #[test]
    fn numeric_value_as_f64_covers_both_variants() {
        assert_eq!(NumericValue::Int(5).as_f64(), 5.0);
        assert_eq!(NumericValue::Double(5.5).as_f64(), 5.5);
    }
}
