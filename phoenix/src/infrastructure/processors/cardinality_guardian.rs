//! `CardinalityGuardian`: bounds the number of distinct
//! (metric-name, attribute-set) combinations using a per-metric HyperLogLog
//! sketch. Once the estimate for a metric exceeds `max_unique`, each data
//! point's attributes are replaced by a single derived `cg_bucket`
//! attribute.

use crate::infrastructure::metrics::MetricsService;
use async_trait::async_trait;
use parking_lot::RwLock;
use phoenix_domain::services::sketches::HyperLogLog;
use phoenix_domain::services::{AdaptiveProcessor, Capabilities};
use phoenix_domain::value_objects::{BoundedParam, ConfigPatch, ConfigStatus, MetricBatch, PatchValue};
use phoenix_domain::PhoenixError;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use twox_hash::XxHash64;

struct State {
    max_unique: BoundedParam<i64>,
    sketches: HashMap<String, HyperLogLog>,
}

pub struct CardinalityGuardian {
    state: RwLock<State>,
    enabled: AtomicBool,
    metrics: Arc<MetricsService>,
}

impl CardinalityGuardian {
    pub fn new(max_unique: u64, max_unique_min: u64, max_unique_max: u64, metrics: Arc<MetricsService>) -> Self {
        Self {
            state: RwLock::new(State {
                max_unique: BoundedParam::new(max_unique as i64, max_unique_min as i64, max_unique_max as i64),
                sketches: HashMap::new(),
            }),
            enabled: AtomicBool::new(true),
            metrics,
        }
    }

    fn attrs_key(attrs: &HashMap<String, String>) -> String {
        let mut pairs: Vec<String> = attrs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        pairs.sort();
        pairs.join(",")
    }

    fn bucket_of(attrs: &HashMap<String, String>, max_unique: u64) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(Self::attrs_key(attrs).as_bytes());
        hasher.finish() % max_unique.max(1)
    }
}

#[async_trait]
impl AdaptiveProcessor for CardinalityGuardian {
    fn processor_id(&self) -> &str {
        "cardinality_guardian"
    }

    async fn consume(&self, mut batch: MetricBatch) -> Result<MetricBatch, PhoenixError> {
        self.metrics.inc_processor_throughput(self.processor_id());
        if !self.enabled.load(Ordering::Acquire) {
            return Ok(batch);
        }

        let mut state = self.state.write();
        let max_unique = state.max_unique.get() as u64;
        let mut bucketed = 0u64;

        for resource in batch.resources.iter_mut() {
            for metric in resource.metrics.iter_mut() {
                let sketch = state.sketches.entry(metric.name.clone()).or_default();
                for dp in metric.data_points.iter() {
                    sketch.add(&Self::attrs_key(&dp.attributes));
                }
                let estimate = sketch.estimate();
                self.metrics.set_cardinality_estimate(&metric.name, estimate);

                if estimate > max_unique as f64 {
                    for dp in metric.data_points.iter_mut() {
                        let bucket = Self::bucket_of(&dp.attributes, max_unique);
                        dp.attributes.clear();
                        dp.attributes.insert("cg_bucket".to_string(), bucket.to_string());
                        bucketed += 1;
                    }
                }
            }
        }
        drop(state);
        self.metrics.inc_cardinality_bucketed(bucketed);

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
            "max_unique" => {
                let mut state = self.state.write();
                let value = patch.new_value.as_i64().ok_or_else(|| PhoenixError::OutOfBounds {
                    parameter: patch.parameter_path.clone(),
                    value: 0.0,
                    min: state.max_unique.min() as f64,
                    max: state.max_unique.max() as f64,
                })?;
                let previous = state.max_unique.get();
                state.max_unique.set(value, &patch.parameter_path)?;
                // Reset sketches whose current estimate now exceeds the
                // lowered max_unique, so stale high-cardinality state does
                // not immediately force every metric into bucketing.
                if value < previous {
                    let names: Vec<String> = state
                        .sketches
                        .iter()
                        .filter(|(_, s)| s.estimate() > value as f64)
                        .map(|(name, _)| name.clone())
                        .collect();
                    for name in names {
                        if let Some(sketch) = state.sketches.get_mut(&name) {
                            sketch.reset();
                        }
                    }
                }
                Ok(())
            }
            other => Err(PhoenixError::UnknownParameter(other.to_string(), self.processor_id().into())),
        }
    }

    fn get_config_status(&self) -> ConfigStatus {
        let state = self.state.read();
        let enabled = self.enabled.load(Ordering::Acquire);
        self.metrics.set_processor_enabled(self.processor_id(), enabled);
        ConfigStatus::new(self.processor_id(), enabled).with_param("max_unique", PatchValue::Int(state.max_unique.get()))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            mutates_in_place: true,
            can_reject_semantic_patches: false,
        }
    }
}
