//! `OthersRollup`: folds resources below a configurable priority threshold
//! into one synthetic "others" resource, preserving the aggregate signal
//! while bounding cardinality. Gauges collapse to last-value-or-average;
//! monotonic sums preserve cumulative semantics via running totals kept
//! across batches.

use crate::infrastructure::metrics::MetricsService;
use async_trait::async_trait;
use parking_lot::RwLock;
use phoenix_domain::services::{AdaptiveProcessor, Capabilities};
use phoenix_domain::value_objects::{
    ConfigPatch, ConfigStatus, DataPoint, DataPointValue, Metric, MetricBatch, MetricType, NumericValue, PatchValue,
    PriorityLevel, ResourceMetrics,
};
use phoenix_domain::PhoenixError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Sum,
    Avg,
}

struct State {
    threshold: PriorityLevel,
    strategy: Strategy,
    prefix: String,
    /// Running cumulative totals for monotonic sum metrics, keyed by metric
    /// name, so the synthetic resource's cumulative sum never regresses.
    running_totals: HashMap<String, f64>,
}

pub struct OthersRollup {
    state: RwLock<State>,
    enabled: AtomicBool,
    metrics: Arc<MetricsService>,
}

impl OthersRollup {
    pub fn new(threshold: PriorityLevel, strategy: Strategy, prefix: impl Into<String>, metrics: Arc<MetricsService>) -> Self {
        Self {
            state: RwLock::new(State {
                threshold,
                strategy,
                prefix: prefix.into(),
                running_totals: HashMap::new(),
            }),
            enabled: AtomicBool::new(true),
            metrics,
        }
    }
}

#[async_trait]
impl AdaptiveProcessor for OthersRollup {
    fn processor_id(&self) -> &str {
        "rollup"
    }

    async fn consume(&self, batch: MetricBatch) -> Result<MetricBatch, PhoenixError> {
        self.metrics.inc_processor_throughput(self.processor_id());
        if !self.enabled.load(Ordering::Acquire) {
            return Ok(batch);
        }

        let mut state = self.state.write();
        let threshold = state.threshold;

        let (mut kept, filtered): (Vec<_>, Vec<_>) = batch
            .resources
            .into_iter()
            .partition(|r| r.priority().map(|p| p >= threshold).unwrap_or(true));

        self.metrics.set_rollup_aggregated_resources(filtered.len() as f64);

        if filtered.is_empty() {
            return Ok(MetricBatch::new(kept));
        }

        // metric name -> (type, values observed this batch)
        let mut by_name: HashMap<String, (MetricType, Vec<f64>)> = HashMap::new();
        for resource in &filtered {
            for metric in &resource.metrics {
                let Some(value) = metric.data_points.last().map(value_of) else {
                    continue;
                };
                by_name
                    .entry(metric.name.clone())
                    .or_insert_with(|| (metric.metric_type, Vec::new()))
                    .1
                    .push(value);
            }
        }

        let mut synthetic_metrics = Vec::with_capacity(by_name.len());
        for (name, (metric_type, values)) in by_name {
            let value = match metric_type {
                MetricType::CumulativeSum | MetricType::DeltaSum => {
                    let batch_total: f64 = values.iter().sum();
                    let total = state.running_totals.entry(name.clone()).or_insert(0.0);
                    *total += batch_total;
                    *total
                }
                MetricType::Gauge => match state.strategy {
                    Strategy::Sum => values.iter().sum(),
                    Strategy::Avg => values.iter().sum::<f64>() / values.len() as f64,
                },
                MetricType::Histogram => values.iter().sum(),
            };
            synthetic_metrics.push(Metric {
                name,
                metric_type,
                data_points: vec![DataPoint {
                    timestamp_unix_nanos: 0,
                    value: DataPointValue::Number(NumericValue::Double(value)),
                    attributes: HashMap::new(),
                }],
            });
        }

        let mut attributes = HashMap::new();
        attributes.insert("resource.name".to_string(), format!("{}others", state.prefix));
        kept.push(ResourceMetrics {
            attributes,
            metrics: synthetic_metrics,
        });

        Ok(MetricBatch::new(kept))
    }

    async fn on_config_patch(&self, patch: &ConfigPatch) -> Result<(), PhoenixError> {
        match patch.parameter_path.as_str() {
            "enabled" => {
                let value = patch.new_value.as_bool().ok_or_else(|| PhoenixError::OutOfBounds {
                    parameter: patch.parameter_path.clone(),
                    value: 0.0,
                    min: 0.0,
                    max: 1.0,
                })?;
                self.enabled.store(value, Ordering::Release);
                Ok(())
            }
            "threshold" => {
                let value = patch
                    .new_value
                    .as_str()
                    .and_then(|s| s.parse::<PriorityLevel>().ok())
                    .ok_or_else(|| PhoenixError::UnknownParameter(patch.parameter_path.clone(), self.processor_id().into()))?;
                self.state.write().threshold = value;
                Ok(())
            }
            "strategy" => {
                let strategy = match patch.new_value.as_str() {
                    Some("sum") => Strategy::Sum,
                    Some("avg") => Strategy::Avg,
                    _ => return Err(PhoenixError::UnknownParameter(patch.parameter_path.clone(), self.processor_id().into())),
                };
                self.state.write().strategy = strategy;
                Ok(())
            }
            "prefix" => {
                let value = patch.new_value.as_str().ok_or_else(|| {
                    PhoenixError::UnknownParameter(patch.parameter_path.clone(), self.processor_id().into())
                })?;
                self.state.write().prefix = value.to_string();
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
            .with_param("threshold", PatchValue::String(state.threshold.to_string()))
            .with_param(
                "strategy",
                PatchValue::String(match state.strategy {
                    Strategy::Sum => "sum".into(),
                    Strategy::Avg => "avg".into(),
                }),
            )
            .with_param("prefix", PatchValue::String(state.prefix.clone()))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            mutates_in_place: false,
            can_reject_semantic_patches: false,
        }
    }
}

fn value_of(dp: &DataPoint) -> f64 {
    match &dp.value {
        DataPointValue::Number(n) => n.as_f64(),
        DataPointValue::Histogram(h) => h.sum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoenix_domain::value_objects::{DataPoint, DataPointValue, Metric, NumericValue};

    fn metrics() -> Arc<MetricsService> {
        Arc::new(MetricsService::new().unwrap())
    }

    fn low_priority_resource(cpu: f64) -> ResourceMetrics {
        let mut attributes = HashMap::new();
        attributes.insert("phoenix.priority".to_string(), "low".to_string());
        ResourceMetrics {
            attributes,
            metrics: vec![Metric {
                name: "cpu.time".into(),
                metric_type: MetricType::CumulativeSum,
                data_points: vec![DataPoint {
                    timestamp_unix_nanos: 0,
                    value: DataPointValue::Number(NumericValue::Double(cpu)),
                    attributes: HashMap::new(),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn folds_low_priority_resources_into_synthetic_resource() {
        let rollup = OthersRollup::new(PriorityLevel::Medium, Strategy::Sum, "phoenix.", metrics());
        let batch = MetricBatch::new(vec![low_priority_resource(1.0), low_priority_resource(2.0)]);
        let out = rollup.consume(batch).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.resources[0].attributes.get("resource.name").unwrap(), "phoenix.others");
    }

    #[tokio::test]
    async fn cumulative_sum_accumulates_across_batches() {
        let rollup = OthersRollup::new(PriorityLevel::Medium, Strategy::Sum, "phoenix.", metrics());
        rollup
            .consume(MetricBatch::new(vec![low_priority_resource(10.0)]))
            .await
            .unwrap();
        let second = rollup
            .consume(MetricBatch::new(vec![low_priority_resource(5.0)]))
            .await
            .unwrap();
        let cpu_metric = &second.resources[0].metrics[0];
        let DataPointValue::Number(n) = &cpu_metric.data_points[0].value else { panic!() };
        assert_eq!(n.as_f64(), 15.0);
    }
}
