//! Phoenix: a self-adapting telemetry-metrics collector.
//!
//! Layout follows the domain's own layering:
//!
//! - `infrastructure` — processors, the governor, the safety monitor, the
//!   pipeline runner, policy loading, and metrics/logging plumbing.
//! - `application` — CLI-facing use cases (`validate-policy`,
//!   `dump-status`, `force-safe-mode`, `exit-safe-mode`).
//! - `presentation` — text rendering for CLI output.
//!
//! Domain types (`AdaptiveProcessor`, `ConfigPatch`, `Policy`, the sketches,
//! the PID controller) live in `phoenix_domain` and are re-exported here for
//! convenience.

pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use phoenix_domain::value_objects::{ConfigPatch, ConfigStatus, MetricBatch, Policy};
pub use phoenix_domain::PhoenixError;

use infrastructure::control::{Governor, MetricsTelemetrySource, TelemetrySource};
use infrastructure::metrics::MetricsService;
use infrastructure::processors::{
    AdaptiveTopK, CardinalityGuardian, HistogramAggregator, OthersRollup, PriorityTagger,
    ReservoirSampler, RollupStrategy,
};
use infrastructure::runtime::{InMemoryProcessorRegistry, PipelineRunner};
use infrastructure::safety::SafetyMonitor;
use phoenix_domain::repositories::PolicyRepository;
use phoenix_domain::services::AdaptiveProcessor;
use phoenix_domain::value_objects::PriorityLevel;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// Reads one declared default for `processor`/`parameter` out of the
/// policy's `processor_defaults` table, if present.
fn default_of<'a>(
    defaults: &'a BTreeMap<String, BTreeMap<String, phoenix_domain::value_objects::PatchValue>>,
    processor: &str,
    parameter: &str,
) -> Option<&'a phoenix_domain::value_objects::PatchValue> {
    defaults.get(processor).and_then(|p| p.get(parameter))
}

fn build_processors(
    policy: &Policy,
    metrics: Arc<MetricsService>,
) -> Result<Vec<Arc<dyn AdaptiveProcessor>>, PhoenixError> {
    let defaults = &policy.processor_defaults;

    let tagger_rules = default_of(defaults, "priority_tagger", "rules")
        .and_then(|v| v.as_rules())
        .map(|rules| rules.to_vec())
        .unwrap_or_default();
    let tagger_attribute_key = default_of(defaults, "priority_tagger", "attribute_key")
        .and_then(|v| v.as_str())
        .unwrap_or("phoenix.priority")
        .to_string();
    let priority_tagger = PriorityTagger::new(tagger_rules, tagger_attribute_key, metrics.clone())?;

    let topk_k = default_of(defaults, "topk", "k_value").and_then(|v| v.as_i64()).unwrap_or(40) as usize;
    let topk_k_min = default_of(defaults, "topk", "k_min").and_then(|v| v.as_i64()).unwrap_or(10) as usize;
    let topk_k_max = default_of(defaults, "topk", "k_max").and_then(|v| v.as_i64()).unwrap_or(200) as usize;
    let topk_counter_field = default_of(defaults, "topk", "counter_field")
        .and_then(|v| v.as_str())
        .unwrap_or("requests")
        .to_string();
    let adaptive_topk = AdaptiveTopK::new(topk_k, topk_k_min, topk_k_max, topk_counter_field, metrics.clone());

    let rollup_threshold = default_of(defaults, "others_rollup", "threshold")
        .and_then(|v| v.as_str())
        .and_then(|s| PriorityLevel::from_str(s).ok())
        .unwrap_or(PriorityLevel::Low);
    let rollup_strategy = match default_of(defaults, "others_rollup", "strategy").and_then(|v| v.as_str()) {
        Some("avg") => RollupStrategy::Avg,
        _ => RollupStrategy::Sum,
    };
    let rollup_prefix = default_of(defaults, "others_rollup", "prefix")
        .and_then(|v| v.as_str())
        .unwrap_or("others.")
        .to_string();
    let others_rollup = OthersRollup::new(rollup_threshold, rollup_strategy, rollup_prefix, metrics.clone());

    let max_unique = default_of(defaults, "cardinality_guardian", "max_unique")
        .and_then(|v| v.as_i64())
        .unwrap_or(1000) as u64;
    let max_unique_min = default_of(defaults, "cardinality_guardian", "max_unique_min")
        .and_then(|v| v.as_i64())
        .unwrap_or(1) as u64;
    let max_unique_max = default_of(defaults, "cardinality_guardian", "max_unique_max")
        .and_then(|v| v.as_i64())
        .unwrap_or(1_000_000) as u64;
    let cardinality_guardian =
        CardinalityGuardian::new(max_unique, max_unique_min, max_unique_max, metrics.clone());

    let reservoir_capacity = default_of(defaults, "reservoir_sampler", "capacity")
        .and_then(|v| v.as_i64())
        .unwrap_or(100) as usize;
    let reservoir_capacity_min = default_of(defaults, "reservoir_sampler", "capacity_min")
        .and_then(|v| v.as_i64())
        .unwrap_or(0) as usize;
    let reservoir_capacity_max = default_of(defaults, "reservoir_sampler", "capacity_max")
        .and_then(|v| v.as_i64())
        .unwrap_or(10_000) as usize;
    let reservoir_sampler =
        ReservoirSampler::new(reservoir_capacity, reservoir_capacity_min, reservoir_capacity_max, metrics.clone());

    let histogram_targets = default_of(defaults, "histogram_aggregator", "target_metrics")
        .and_then(|v| v.as_str())
        .map(|csv| csv.split(',').map(str::to_string).collect())
        .unwrap_or_default();
    let histogram_max_buckets = default_of(defaults, "histogram_aggregator", "max_buckets")
        .and_then(|v| v.as_i64())
        .unwrap_or(20) as usize;
    let histogram_aggregator = HistogramAggregator::new(histogram_targets, histogram_max_buckets, metrics);

    Ok(vec![
        Arc::new(priority_tagger),
        Arc::new(adaptive_topk),
        Arc::new(others_rollup),
        Arc::new(cardinality_guardian),
        Arc::new(reservoir_sampler),
        Arc::new(histogram_aggregator),
    ])
}

/// The fully wired runtime: one of every long-lived service the bootstrap
/// process needs, assembled from a loaded policy. Building the six
/// processors in pipeline order here (rather than leaving it to the
/// bootstrap crate) keeps that fixed order in one place.
pub struct PhoenixRuntime {
    pub registry: Arc<InMemoryProcessorRegistry>,
    pub pipeline: Arc<PipelineRunner>,
    pub governor: Arc<Governor>,
    pub safety_monitor: Arc<SafetyMonitor>,
    pub metrics: Arc<MetricsService>,
    pub policy_repo: Arc<dyn PolicyRepository>,
}

impl PhoenixRuntime {
    /// Builds the runtime against `metrics`, the same registry the policy
    /// repository publishes its reload counters to, so every `phoenix.*`
    /// metric (processors, governor, safety, policy reload) is scraped from
    /// one place.
    pub fn new(policy_repo: Arc<dyn PolicyRepository>, metrics: Arc<MetricsService>) -> Result<Self, PhoenixError> {
        let policy = policy_repo.current();

        let processors = build_processors(&policy, metrics.clone())?;
        let registry = Arc::new(InMemoryProcessorRegistry::new(processors));
        let pipeline = Arc::new(PipelineRunner::new(registry.clone()));

        let safety_monitor = Arc::new(SafetyMonitor::new(
            registry.clone() as Arc<dyn phoenix_domain::repositories::ProcessorRegistry>,
            metrics.clone(),
        ));

        let telemetry: Arc<dyn TelemetrySource> = Arc::new(MetricsTelemetrySource::new(metrics.clone()));
        let governor = Arc::new(Governor::new(
            policy_repo.clone(),
            registry.clone() as Arc<dyn phoenix_domain::repositories::ProcessorRegistry>,
            metrics.clone(),
            telemetry,
            safety_monitor.safe_mode_flag(),
        ));

        Ok(Self {
            registry,
            pipeline,
            governor,
            safety_monitor,
            metrics,
            policy_repo,
        })
    }
}
