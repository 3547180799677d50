//! `ReservoirSampler`: maintains a uniform random sample of size `R` per
//! stratum (default stratum key: `phoenix.priority`) using classical
//! reservoir sampling with weight 1 per incoming resource.

use crate::infrastructure::metrics::MetricsService;
use async_trait::async_trait;
use parking_lot::RwLock;
use phoenix_domain::services::sketches::Reservoir;
use phoenix_domain::services::{AdaptiveProcessor, Capabilities};
use phoenix_domain::value_objects::{BoundedParam, ConfigPatch, ConfigStatus, MetricBatch, PatchValue, ResourceMetrics};
use phoenix_domain::PhoenixError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct State {
    capacity: BoundedParam<i64>,
    strata: HashMap<String, Reservoir<ResourceMetrics>>,
    rng: StdRng,
}

pub struct ReservoirSampler {
    state: RwLock<State>,
    enabled: AtomicBool,
    metrics: Arc<MetricsService>,
}

impl ReservoirSampler {
    pub fn new(capacity: usize, capacity_min: usize, capacity_max: usize, metrics: Arc<MetricsService>) -> Self {
        Self {
            state: RwLock::new(State {
                capacity: BoundedParam::new(capacity as i64, capacity_min as i64, capacity_max as i64),
                strata: HashMap::new(),
                rng: StdRng::seed_from_u64(0x50480e1f),
            }),
            enabled: AtomicBool::new(true),
            metrics,
        }
    }

    fn stratum_key(resource: &ResourceMetrics) -> String {
        resource
            .priority()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "unset".to_string())
    }
}

#[async_trait]
impl AdaptiveProcessor for ReservoirSampler {
    fn processor_id(&self) -> &str {
        "reservoir_sampler"
    }

    async fn consume(&self, batch: MetricBatch) -> Result<MetricBatch, PhoenixError> {
        self.metrics.inc_processor_throughput(self.processor_id());
        if !self.enabled.load(Ordering::Acquire) {
            return Ok(batch);
        }

        let mut state = self.state.write();
        let capacity = state.capacity.get() as usize;
        for resource in batch.resources {
            let key = Self::stratum_key(&resource);
            let reservoir = state
                .strata
                .entry(key)
                .or_insert_with(|| Reservoir::new(capacity));
            let mut rng = state.rng.clone();
            reservoir.offer(resource, &mut rng);
            state.rng = rng;
        }

        let sampled: Vec<ResourceMetrics> = state.strata.values().flat_map(|r| r.items().to_vec()).collect();
        Ok(MetricBatch::new(sampled))
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
            "capacity" => {
                let mut state = self.state.write();
                let value = patch.new_value.as_i64().ok_or_else(|| PhoenixError::OutOfBounds {
                    parameter: patch.parameter_path.clone(),
                    value: 0.0,
                    min: state.capacity.min() as f64,
                    max: state.capacity.max() as f64,
                })?;
                state.capacity.set(value, &patch.parameter_path)?;
                let new_capacity = state.capacity.get() as usize;
                let mut rng = state.rng.clone();
                for reservoir in state.strata.values_mut() {
                    reservoir.resize(new_capacity, &mut rng);
                }
                state.rng = rng;
                Ok(())
            }
            other => Err(PhoenixError::UnknownParameter(other.to_string(), self.processor_id().into())),
        }
    }

    fn get_config_status(&self) -> ConfigStatus {
        let state = self.state.read();
        let enabled = self.enabled.load(Ordering::Acquire);
        self.metrics.set_processor_enabled(self.processor_id(), enabled);
        ConfigStatus::new(self.processor_id(), enabled).with_param("capacity", PatchValue::Int(state.capacity.get()))
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
    use phoenix_domain::value_objects::PriorityLevel;

    fn metrics() -> Arc<MetricsService> {
        Arc::new(MetricsService::new().unwrap())
    }

    fn resource_with_priority(level: PriorityLevel) -> ResourceMetrics {
        let mut r = ResourceMetrics {
            attributes: HashMap::new(),
            metrics: Vec::new(),
        };
        r.set_priority(level);
        r
    }

    #[tokio::test]
    async fn reservoir_does_not_exceed_capacity_per_stratum() {
        let sampler = ReservoirSampler::new(3, 0, 1000, metrics());
        let mut batch = MetricBatch::empty();
        for _ in 0..20 {
            batch.resources.push(resource_with_priority(PriorityLevel::Low));
        }
        let out = sampler.consume(batch).await.unwrap();
        assert!(out.len() <= 3);
    }

    #[tokio::test]
    async fn capacity_resize_down_truncates() {
        let sampler = ReservoirSampler::new(5, 0, 1000, metrics());
        let mut batch = MetricBatch::empty();
        for _ in 0..5 {
            batch.resources.push(resource_with_priority(PriorityLevel::High));
        }
        sampler.consume(batch).await.unwrap();

        let patch = ConfigPatch::new(
            "reservoir_sampler",
            "capacity",
            PatchValue::Int(2),
            "pid",
            phoenix_domain::value_objects::PatchSeverity::Normal,
            phoenix_domain::value_objects::PatchSource::Pid,
            0,
        );
        sampler.on_config_patch(&patch).await.unwrap();
        let status = sampler.get_config_status();
        assert_eq!(status.parameters.get("capacity"), Some(&PatchValue::Int(2)));
    }

    #[tokio::test]
    async fn capacity_patch_rejects_out_of_bounds() {
        let sampler = ReservoirSampler::new(5, 1, 10, metrics());
        let patch = ConfigPatch::new(
            "reservoir_sampler",
            "capacity",
            PatchValue::Int(500),
            "pid",
            phoenix_domain::value_objects::PatchSeverity::Normal,
            phoenix_domain::value_objects::PatchSource::Pid,
            0,
        );
        let err = sampler.on_config_patch(&patch).await.unwrap_err();
        assert!(matches!(err, PhoenixError::OutOfBounds { .. }));
    }
}
