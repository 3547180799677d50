//! `HistogramAggregator`: re-buckets configured histogram metrics to either
//! a caller-supplied boundary list or a count cap, coalescing adjacent
//! buckets. Total count and total sum are always preserved exactly.

use crate::infrastructure::metrics::MetricsService;
use async_trait::async_trait;
use parking_lot::RwLock;
use phoenix_domain::services::{AdaptiveProcessor, Capabilities};
use phoenix_domain::value_objects::{
    ConfigPatch, ConfigStatus, DataPointValue, HistogramBucket, HistogramValue, MetricBatch, MetricType, PatchValue,
};
use phoenix_domain::PhoenixError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
enum Rebucketing {
    CustomBoundaries(Vec<f64>),
    MaxBuckets(usize),
}

struct State {
    target_metrics: Vec<String>,
    rebucketing: Rebucketing,
}

pub struct HistogramAggregator {
    state: RwLock<State>,
    enabled: AtomicBool,
    metrics: Arc<MetricsService>,
}

impl HistogramAggregator {
    pub fn new(target_metrics: Vec<String>, max_buckets: usize, metrics: Arc<MetricsService>) -> Self {
        Self {
            state: RwLock::new(State {
                target_metrics,
                rebucketing: Rebucketing::MaxBuckets(max_buckets),
            }),
            enabled: AtomicBool::new(true),
            metrics,
        }
    }
}

/// Coalesces adjacent buckets down to `max_buckets`, preserving total count
/// exactly (bucket bounds are merged by combining neighbors, never by
/// dropping data).
fn coalesce(buckets: &[HistogramBucket], max_buckets: usize) -> Vec<HistogramBucket> {
    if buckets.len() <= max_buckets || max_buckets == 0 {
        return buckets.to_vec();
    }
    let group_size = (buckets.len() as f64 / max_buckets as f64).ceil() as usize;
    buckets
        .chunks(group_size)
        .map(|chunk| HistogramBucket {
            upper_bound: chunk.last().map(|b| b.upper_bound).unwrap_or(f64::INFINITY),
            count: chunk.iter().map(|b| b.count).sum(),
        })
        .collect()
}

/// Remaps bucket counts onto `boundaries`: each new bucket accumulates all
/// points whose original upper bound is <= the new boundary.
fn remap_to_boundaries(buckets: &[HistogramBucket], boundaries: &[f64]) -> Vec<HistogramBucket> {
    let mut sorted_boundaries = boundaries.to_vec();
    sorted_boundaries.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mut result: Vec<HistogramBucket> = sorted_boundaries
        .iter()
        .map(|&upper_bound| HistogramBucket { upper_bound, count: 0 })
        .collect();

    for original in buckets {
        if let Some(target) = result.iter_mut().find(|b| original.upper_bound <= b.upper_bound) {
            target.count += original.count;
        } else if let Some(last) = result.last_mut() {
            last.count += original.count;
        }
    }
    result
}

#[async_trait]
impl AdaptiveProcessor for HistogramAggregator {
    fn processor_id(&self) -> &str {
        "histogram_aggregator"
    }

    async fn consume(&self, mut batch: MetricBatch) -> Result<MetricBatch, PhoenixError> {
        self.metrics.inc_processor_throughput(self.processor_id());
        if !self.enabled.load(Ordering::Acquire) {
            return Ok(batch);
        }

        let state = self.state.read();
        for resource in batch.resources.iter_mut() {
            for metric in resource.metrics.iter_mut() {
                if metric.metric_type != MetricType::Histogram || !state.target_metrics.contains(&metric.name) {
                    continue;
                }
                for dp in metric.data_points.iter_mut() {
                    let DataPointValue::Histogram(hv) = &mut dp.value else {
                        continue;
                    };
                    let new_buckets = match &state.rebucketing {
                        Rebucketing::MaxBuckets(max) => coalesce(&hv.buckets, *max),
                        Rebucketing::CustomBoundaries(boundaries) => remap_to_boundaries(&hv.buckets, boundaries),
                    };
                    let preserved_count: u64 = new_buckets.iter().map(|b| b.count).sum();
                    debug_assert_eq!(preserved_count, hv.count, "re-bucketing must preserve total count");
                    *hv = HistogramValue {
                        count: hv.count,
                        sum: hv.sum,
                        buckets: new_buckets,
                    };
                }
            }
        }

        Ok(batch)
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
            "max_buckets" => {
                let value = patch.new_value.as_i64().ok_or_else(|| PhoenixError::OutOfBounds {
                    parameter: patch.parameter_path.clone(),
                    value: 0.0,
                    min: 1.0,
                    max: i64::MAX as f64,
                })?;
                if value < 1 {
                    return Err(PhoenixError::OutOfBounds {
                        parameter: patch.parameter_path.clone(),
                        value: value as f64,
                        min: 1.0,
                        max: i64::MAX as f64,
                    });
                }
                self.state.write().rebucketing = Rebucketing::MaxBuckets(value as usize);
                Ok(())
            }
            // Switches to the caller-supplied boundary list strategy: a
            // comma-separated list of upper bounds, e.g. "0.1,0.5,1.0,5.0".
            "boundaries" => {
                let raw = patch.new_value.as_str().ok_or_else(|| {
                    PhoenixError::UnknownParameter(patch.parameter_path.clone(), self.processor_id().into())
                })?;
                let boundaries: Vec<f64> = raw
                    .split(',')
                    .map(|s| s.trim().parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| PhoenixError::OutOfBounds {
                        parameter: patch.parameter_path.clone(),
                        value: 0.0,
                        min: f64::NEG_INFINITY,
                        max: f64::INFINITY,
                    })?;
                if boundaries.is_empty() {
                    return Err(PhoenixError::OutOfBounds {
                        parameter: patch.parameter_path.clone(),
                        value: 0.0,
                        min: 1.0,
                        max: f64::INFINITY,
                    });
                }
                self.state.write().rebucketing = Rebucketing::CustomBoundaries(boundaries);
                Ok(())
            }
            other => Err(PhoenixError::UnknownParameter(other.to_string(), self.processor_id().into())),
        }
    }

    fn get_config_status(&self) -> ConfigStatus {
        let state = self.state.read();
        let enabled = self.enabled.load(Ordering::Acquire);
        self.metrics.set_processor_enabled(self.processor_id(), enabled);
        let max_buckets = match state.rebucketing {
            Rebucketing::MaxBuckets(n) => n as i64,
            Rebucketing::CustomBoundaries(ref b) => b.len() as i64,
        };
        ConfigStatus::new(self.processor_id(), enabled).with_param("max_buckets", PatchValue::Int(max_buckets))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            mutates_in_place: true,
            can_reject_semantic_patches: false,
        }
    }
}
