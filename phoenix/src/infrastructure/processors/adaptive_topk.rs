//! `AdaptiveTopK`: retains only the `k` resources with the largest value of
//! a configured counter field, bounding downstream cardinality by `k`.
//! Backed by the Space-Saving heavy-hitter sketch.

use crate::infrastructure::metrics::MetricsService;
use async_trait::async_trait;
use parking_lot::RwLock;
use phoenix_domain::services::sketches::SpaceSaving;
use phoenix_domain::services::{AdaptiveProcessor, Capabilities};
use phoenix_domain::value_objects::{BoundedParam, ConfigPatch, ConfigStatus, MetricBatch, PatchValue};
use phoenix_domain::PhoenixError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct State {
    sketch: SpaceSaving,
    counter_field: String,
    /// Bounds-checked mirror of `sketch`'s own k; rejects an out-of-range
    /// `k_value` patch before the sketch is ever resized.
    k: BoundedParam<i64>,
}

pub struct AdaptiveTopK {
    state: RwLock<State>,
    enabled: AtomicBool,
    metrics: Arc<MetricsService>,
}

impl AdaptiveTopK {
    pub fn new(k: usize, k_min: usize, k_max: usize, counter_field: impl Into<String>, metrics: Arc<MetricsService>) -> Self {
        Self {
            state: RwLock::new(State {
                sketch: SpaceSaving::new(k),
                counter_field: counter_field.into(),
                k: BoundedParam::new(k as i64, k_min as i64, k_max as i64),
            }),
            enabled: AtomicBool::new(true),
            metrics,
        }
    }

    fn resource_id(attributes: &std::collections::HashMap<String, String>) -> String {
        // A stable identity for the resource: its process name if present,
        // else a sorted join of all attributes.
        if let Some(name) = attributes.get("process.name") {
            return name.clone();
        }
        let mut pairs: Vec<String> = attributes.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        pairs.join(",")
    }

    fn weight_of(resource: &phoenix_domain::value_objects::ResourceMetrics, counter_field: &str) -> f64 {
        resource
            .metrics
            .iter()
            .find(|m| m.name == counter_field)
            .and_then(|m| m.data_points.last())
            .map(|dp| match &dp.value {
                phoenix_domain::value_objects::DataPointValue::Number(n) => n.as_f64(),
                phoenix_domain::value_objects::DataPointValue::Histogram(h) => h.sum,
            })
            .unwrap_or(0.0)
    }
}

#[async_trait]
impl AdaptiveProcessor for AdaptiveTopK {
    fn processor_id(&self) -> &str {
        "topk"
    }

    async fn consume(&self, batch: MetricBatch) -> Result<MetricBatch, PhoenixError> {
        self.metrics.inc_processor_throughput(self.processor_id());
        if !self.enabled.load(Ordering::Acquire) {
            return Ok(batch);
        }

        let mut state = self.state.write();
        let counter_field = state.counter_field.clone();
        for resource in &batch.resources {
            let id = Self::resource_id(&resource.attributes);
            let weight = Self::weight_of(resource, &counter_field);
            state.sketch.observe(&id, weight.max(0.0));
        }

        let tracked_ids: std::collections::HashSet<String> =
            state.sketch.counters().iter().map(|c| c.id.clone()).collect();
        let coverage = state.sketch.coverage();
        let k_value = state.sketch.k() as f64;
        let tracked_count = state.sketch.tracked_count() as f64;
        drop(state);

        self.metrics.set_topk_status(k_value, coverage, tracked_count);

        // Critical-priority resources bypass the sketch entirely so they
        // cannot be dropped by top-k filtering (spec: tagging precedes
        // top-k so critical resources can be whitelisted past the sketch).
        let retained: Vec<_> = batch
            .resources
            .into_iter()
            .filter(|r| {
                r.priority() == Some(phoenix_domain::value_objects::PriorityLevel::Critical)
                    || tracked_ids.contains(&Self::resource_id(&r.attributes))
            })
            .collect();

        Ok(MetricBatch::new(retained))
    }

    async fn on_config_patch(&self, patch: &ConfigPatch) -> Result<(), PhoenixError> {
        match patch.parameter_path.as_str() {
            "enabled" => {
                let was_enabled = self.enabled.load(Ordering::Acquire);
                let value = patch.new_value.as_bool().ok_or_else(|| PhoenixError::OutOfBounds {
                    parameter: patch.parameter_path.clone(),
                    value: 0.0,
                    min: 0.0,
                    max: 1.0,
                })?;
                if !was_enabled && value {
                    // off -> on transition resets the sketch.
                    self.state.write().sketch.reset();
                }
                self.enabled.store(value, Ordering::Release);
                Ok(())
            }
            "k_value" => {
                let mut state = self.state.write();
                let k = patch.new_value.as_i64().ok_or_else(|| PhoenixError::OutOfBounds {
                    parameter: patch.parameter_path.clone(),
                    value: 0.0,
                    min: state.k.min() as f64,
                    max: state.k.max() as f64,
                })?;
                state.k.set(k, &patch.parameter_path)?;
                state.sketch.resize(state.k.get() as usize);
                Ok(())
            }
            "counter_field" => {
                let value = patch.new_value.as_str().ok_or_else(|| {
                    PhoenixError::UnknownParameter(patch.parameter_path.clone(), self.processor_id().into())
                })?;
                self.state.write().counter_field = value.to_string();
                Ok(())
            }
            other => Err(PhoenixError::UnknownParameter(other.to_string(), self.processor_id().into())),
        }
    }

    fn get_config_status(&self) -> ConfigStatus {
        let state = self.state.read();
        let enabled = self.enabled.load(Ordering::Acquire);
        self.metrics.set_processor_enabled(self.processor_id(), enabled);
        ConfigStatus::new(self.processor_id(), enabled)
            .with_param("k_value", PatchValue::Int(state.sketch.k() as i64))
            .with_param("counter_field", PatchValue::String(state.counter_field.clone()))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            mutates_in_place: false,
            can_reject_semantic_patches: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoenix_domain::value_objects::{
        DataPoint, DataPointValue, Metric, MetricType, NumericValue, PatchSeverity, PatchSource, ResourceMetrics,
    };
    use std::collections::HashMap;

    fn metrics() -> Arc<MetricsService> {
        Arc::new(MetricsService::new().unwrap())
    }

    fn resource_with_weight(name: &str, weight: f64) -> ResourceMetrics {
        let mut attributes = HashMap::new();
        attributes.insert("process.name".to_string(), name.to_string());
        ResourceMetrics {
            attributes,
            metrics: vec![Metric {
                name: "cpu.time".into(),
                metric_type: MetricType::Gauge,
                data_points: vec![DataPoint {
                    timestamp_unix_nanos: 0,
                    value: DataPointValue::Number(NumericValue::Double(weight)),
                    attributes: HashMap::new(),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn retains_only_k_heaviest_resources() {
        let topk = AdaptiveTopK::new(2, 1, 10, "cpu.time", metrics());
        let batch = MetricBatch::new(vec![
            resource_with_weight("a", 1.0),
            resource_with_weight("b", 100.0),
            resource_with_weight("c", 50.0),
        ]);
        let out = topk.consume(batch).await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn resize_rejects_out_of_bounds_k() {
        let topk = AdaptiveTopK::new(10, 5, 20, "cpu.time", metrics());
        let patch = ConfigPatch::new(
            "topk",
            "k_value",
            PatchValue::Int(500),
            "pid",
            PatchSeverity::Normal,
            PatchSource::Pid,
            0,
        );
        let err = topk.on_config_patch(&patch).await.unwrap_err();
        assert!(matches!(err, PhoenixError::OutOfBounds { .. }));
    }
}
