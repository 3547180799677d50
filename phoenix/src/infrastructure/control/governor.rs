//! `Governor`: the closed control loop. Each tick it scrapes self-telemetry,
//! runs one `PidController` per declared controller, projects the output
//! onto a `ConfigPatch`, validates it, and applies or records it according
//! to the active autonomy level (spec §4.9).

use crate::infrastructure::control::bayesian_fallback::BayesianFallback;
use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::safety::safety_monitor::SafeModeFlag;
use chrono::Utc;
use parking_lot::RwLock;
use phoenix_domain::aggregates::{Decision, DecisionResult, DecisionTrace};
use phoenix_domain::entities::SelfTelemetrySample;
use phoenix_domain::events::GovernorEvent;
use phoenix_domain::repositories::{PolicyRepository, ProcessorRegistry};
use phoenix_domain::services::{PidConfig, PidController};
use phoenix_domain::value_objects::{
    AutonomyLevel, ConfigPatch, ControllerSpec, PatchProjection, PatchSeverity, PatchSource,
    PatchValue, ProjectionMapping,
};
use phoenix_domain::PhoenixError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Capacity of the `GovernorEvent` broadcast channel. Events are diagnostic,
/// not control flow, so a slow or absent subscriber simply misses old ones
/// rather than applying backpressure to the tick loop.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How many recent patch ids are remembered for idempotence checking
/// (`ConfigPatch::new`'s documented "duplicate patch_id is a no-op"
/// contract). Oldest ids are evicted once this many are tracked.
const PATCH_ID_DEDUP_CAPACITY: usize = 1024;

/// FIFO-bounded set of recently-seen patch ids, so a repeated patch_id is
/// recognized as a no-op without the set growing without bound across a
/// long-running process.
#[derive(Default)]
struct SeenPatchIds {
    order: VecDeque<String>,
    set: HashSet<String>,
}

impl SeenPatchIds {
    /// Returns `true` if `patch_id` was already seen; otherwise records it.
    fn check_and_record(&mut self, patch_id: &str) -> bool {
        if !self.set.insert(patch_id.to_string()) {
            return true;
        }
        self.order.push_back(patch_id.to_string());
        if self.order.len() > PATCH_ID_DEDUP_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        false
    }
}

/// Produces the self-telemetry sample the governor scrapes each tick.
/// Infrastructure wires this to [`MetricsService`]'s own gauges, keeping the
/// domain-facing `Governor` independent of the Prometheus registry shape.
pub trait TelemetrySource: Send + Sync {
    fn sample(&self, now_unix_nanos: i64) -> SelfTelemetrySample;
}

/// Reads the handful of KPIs controllers commonly target directly off
/// [`MetricsService`]'s gauges, rather than round-tripping through the text
/// exposition format.
pub struct MetricsTelemetrySource {
    metrics: Arc<MetricsService>,
}

impl MetricsTelemetrySource {
    pub fn new(metrics: Arc<MetricsService>) -> Self {
        Self { metrics }
    }
}

impl TelemetrySource for MetricsTelemetrySource {
    fn sample(&self, now_unix_nanos: i64) -> SelfTelemetrySample {
        let mut sample = SelfTelemetrySample::new(now_unix_nanos);
        for (name, value) in self.metrics.gauge_snapshot() {
            sample.record(name, value);
        }
        sample
    }
}

struct ControllerState {
    pid: PidController,
    bayesian: Option<BayesianFallback>,
    bayesian_active: bool,
    stall_ticks: u32,
    last_kpi_value: Option<f64>,
    rng: StdRng,
}

/// Per-(processor, parameter) cooldown bookkeeping, evaluated against
/// `governance.patch_cooldown_seconds`.
type CooldownKey = (String, String);

pub struct Governor {
    policy_repo: Arc<dyn PolicyRepository>,
    registry: Arc<dyn ProcessorRegistry>,
    metrics: Arc<MetricsService>,
    telemetry: Arc<dyn TelemetrySource>,
    safe_mode: Arc<SafeModeFlag>,
    controllers: RwLock<HashMap<String, ControllerState>>,
    decision_trace: RwLock<DecisionTrace>,
    recent_patch_times: RwLock<VecDeque<i64>>,
    last_patch_time: RwLock<HashMap<CooldownKey, i64>>,
    seen_patch_ids: RwLock<SeenPatchIds>,
    tick: RwLock<u64>,
    events: broadcast::Sender<GovernorEvent>,
}

impl Governor {
    pub fn new(
        policy_repo: Arc<dyn PolicyRepository>,
        registry: Arc<dyn ProcessorRegistry>,
        metrics: Arc<MetricsService>,
        telemetry: Arc<dyn TelemetrySource>,
        safe_mode: Arc<SafeModeFlag>,
    ) -> Self {
        let capacity = policy_repo.current().governance.decision_trace_capacity;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            policy_repo,
            registry,
            metrics,
            telemetry,
            safe_mode,
            controllers: RwLock::new(HashMap::new()),
            decision_trace: RwLock::new(DecisionTrace::new(capacity)),
            recent_patch_times: RwLock::new(VecDeque::new()),
            last_patch_time: RwLock::new(HashMap::new()),
            seen_patch_ids: RwLock::new(SeenPatchIds::default()),
            tick: RwLock::new(0),
            events,
        }
    }

    pub fn decision_trace_snapshot(&self) -> Vec<Decision> {
        self.decision_trace.read().snapshot()
    }

    /// Subscribes to the governor's structured event stream (KPI-missing,
    /// patch applied/rejected). Diagnostic only; nothing in the control loop
    /// depends on a subscriber being present.
    pub fn subscribe(&self) -> broadcast::Receiver<GovernorEvent> {
        self.events.subscribe()
    }

    fn pid_config_from_spec(spec: &ControllerSpec) -> PidConfig {
        PidConfig {
            kp: spec.kp,
            ki: spec.ki,
            kd: spec.kd,
            derivative_filter_alpha: spec.derivative_filter_alpha,
            output_min: spec.output_min,
            output_max: spec.output_max,
            anti_windup_kaw: spec.anti_windup_kaw,
            anti_windup: spec.anti_windup_kaw > 0.0,
            hysteresis_percent: spec.hysteresis_percent,
            oscillation_window: spec.oscillation_window,
            oscillation_significance: 1e-6,
            oscillation_fraction_threshold: spec.oscillation_zero_crossing_fraction,
            oscillation_min_duration_evals: spec.oscillation_min_duration_ticks,
            oscillation_reset_duration_evals: spec.oscillation_reset_duration_ticks,
        }
    }

    fn ensure_controller<'a>(
        controllers: &'a mut HashMap<String, ControllerState>,
        spec: &ControllerSpec,
    ) -> &'a mut ControllerState {
        controllers.entry(spec.name.clone()).or_insert_with(|| ControllerState {
            pid: PidController::new(Self::pid_config_from_spec(spec)),
            bayesian: if spec.bayesian_fallback_enabled {
                Some(BayesianFallback::new(spec.output_min, spec.output_max))
            } else {
                None
            },
            bayesian_active: false,
            stall_ticks: 0,
            last_kpi_value: None,
            rng: StdRng::seed_from_u64(0x9047_3c11_u64.wrapping_add(
                spec.name.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64)),
            )),
        })
    }

    fn project(spec: &ControllerSpec, u: f64) -> Vec<(PatchProjection, PatchValue)> {
        spec.outputs
            .iter()
            .map(|projection| {
                let value = match &projection.mapping {
                    ProjectionMapping::Affine { base, scale_factor } => {
                        let raw = base + scale_factor * u;
                        let clamped = raw.clamp(projection.min_value, projection.max_value);
                        if clamped.fract() == 0.0 {
                            PatchValue::Int(clamped as i64)
                        } else {
                            PatchValue::Double(clamped)
                        }
                    }
                    ProjectionMapping::ValueMap { breakpoints } => {
                        let chosen = breakpoints
                            .iter()
                            .min_by(|a, b| {
                                (a.0 - u).abs().partial_cmp(&(b.0 - u).abs()).unwrap()
                            })
                            .map(|(_, value)| value.clone())
                            .unwrap_or(PatchValue::Double(u));
                        chosen
                    }
                };
                (projection.clone(), value)
            })
            .collect()
    }

    fn rate_limited(&self, now_unix: i64, max_per_minute: u32) -> bool {
        let mut recent = self.recent_patch_times.write();
        while let Some(&oldest) = recent.front() {
            if now_unix - oldest >= 60 {
                recent.pop_front();
            } else {
                break;
            }
        }
        recent.len() as u32 >= max_per_minute
    }

    fn in_cooldown(&self, key: &CooldownKey, now_unix: i64, cooldown_seconds: u64) -> bool {
        self.last_patch_time
            .read()
            .get(key)
            .map(|&last| now_unix - last < cooldown_seconds as i64)
            .unwrap_or(false)
    }

    /// Runs one full evaluation across every declared controller. `dt` is
    /// the elapsed seconds since the previous tick.
    #[instrument(skip(self))]
    pub async fn run_tick(&self, dt: f64) -> Result<(), PhoenixError> {
        let policy = self.policy_repo.current();
        let now_unix_nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let now_unix = now_unix_nanos / 1_000_000_000;
        let sample = self.telemetry.sample(now_unix_nanos);
        let tick = {
            let mut tick = self.tick.write();
            *tick += 1;
            *tick
        };

        for spec in &policy.controllers {
            let Some(kpi_value) = sample.get(&spec.kpi_name) else {
                self.metrics.inc_kpi_missing();
                warn!(controller = %spec.name, kpi = %spec.kpi_name, "KPI missing from self-telemetry this tick");
                let _ = self.events.send(GovernorEvent::KpiMissing {
                    controller: spec.name.clone(),
                    kpi_name: spec.kpi_name.clone(),
                });
                continue;
            };

            let mut controllers = self.controllers.write();
            let state = Self::ensure_controller(&mut controllers, spec);

            let coverage_stalled = state
                .last_kpi_value
                .map(|prev| (prev - kpi_value).abs() < 1e-9)
                .unwrap_or(false);
            state.last_kpi_value = Some(kpi_value);
            if coverage_stalled {
                state.stall_ticks += 1;
            } else {
                state.stall_ticks = 0;
            }

            let breaker_tripped = state.pid.circuit_tripped();
            let should_fall_back = state.bayesian.is_some()
                && (breaker_tripped || state.stall_ticks >= spec.bayesian_stall_ticks);

            let u = if should_fall_back {
                state.bayesian_active = true;
                let candidate = state
                    .bayesian
                    .as_ref()
                    .unwrap()
                    .propose(&mut state.rng);
                let score = -((spec.target - kpi_value).abs());
                state.bayesian.as_mut().unwrap().observe(candidate, score);
                candidate
            } else {
                if state.bayesian_active {
                    state.bayesian_active = false;
                    state.stall_ticks = 0;
                }
                state.pid.evaluate(spec.target, kpi_value, dt)
            };

            self.metrics.set_pid_status(
                &spec.name,
                spec.target - kpi_value,
                state.pid.integral(),
                u,
                state.pid.circuit_tripped(),
            );

            let patch_source = if state.bayesian_active { PatchSource::Bayesian } else { PatchSource::Pid };
            drop(controllers);

            for (projection, value) in Self::project(spec, u) {
                let patch = ConfigPatch::new(
                    projection.target_processor.clone(),
                    projection.parameter_path.clone(),
                    value,
                    format!("controller '{}' output {u:.4}", spec.name),
                    PatchSeverity::Normal,
                    patch_source,
                    now_unix_nanos,
                );
                self.validate_apply_record(&policy, patch, now_unix, tick).await;
            }
        }

        Ok(())
    }

    async fn validate_apply_record(
        &self,
        policy: &phoenix_domain::value_objects::Policy,
        patch: ConfigPatch,
        now_unix: i64,
        tick: u64,
    ) {
        let key: CooldownKey = (patch.target_processor.clone(), patch.parameter_path.clone());

        if self.seen_patch_ids.write().check_and_record(&patch.patch_id) {
            // A repeated patch_id is a no-op: already applied (or already
            // decided) once, so it is neither reapplied nor re-recorded.
            info!(patch_id = %patch.patch_id, "duplicate patch_id, skipping");
            return;
        }

        if self.safe_mode.is_set() && !patch.safety_override {
            self.reject(patch, "safe mode active", tick);
            return;
        }

        if self.registry.get(&patch.target_processor).is_none() {
            self.reject(patch, "unknown target processor", tick);
            return;
        }

        if self.rate_limited(now_unix, policy.governance.max_patches_per_minute) {
            self.reject(patch, "rate limit exceeded", tick);
            return;
        }

        if self.in_cooldown(&key, now_unix, policy.governance.patch_cooldown_seconds) {
            self.reject(patch, "target still in cooldown", tick);
            return;
        }

        match policy.governance.autonomy_level {
            AutonomyLevel::Shadow => {
                self.record(patch, DecisionResult::Shadowed, tick);
            }
            AutonomyLevel::Advisory => {
                self.record(patch, DecisionResult::Advised, tick);
            }
            AutonomyLevel::Active => match self.registry.apply_patch(&patch).await {
                Ok(()) => {
                    self.metrics.inc_patches_applied();
                    self.recent_patch_times.write().push_back(now_unix);
                    self.last_patch_time.write().insert(key, now_unix);
                    info!(processor = %patch.target_processor, parameter = %patch.parameter_path, "patch applied");
                    let _ = self.events.send(GovernorEvent::PatchApplied { patch: patch.clone() });
                    self.record(patch, DecisionResult::Applied, tick);
                }
                Err(err) => {
                    self.reject(patch, &err.to_string(), tick);
                }
            },
        }
    }

    fn reject(&self, patch: ConfigPatch, reason: &str, tick: u64) {
        self.metrics.inc_patches_rejected(reason);
        warn!(processor = %patch.target_processor, parameter = %patch.parameter_path, reason, "patch rejected");
        let _ = self.events.send(GovernorEvent::PatchRejected {
            patch: patch.clone(),
            reason: reason.to_string(),
        });
        self.record(
            patch,
            DecisionResult::Rejected { reason: reason.to_string() },
            tick,
        );
    }

    fn record(&self, patch: ConfigPatch, result: DecisionResult, tick: u64) {
        self.decision_trace.write().record(Decision { patch, result, tick });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::runtime::InMemoryProcessorRegistry;
    use phoenix_domain::services::{AdaptiveProcessor, Capabilities};
    use phoenix_domain::value_objects::{
        ConfigStatus, GovernanceSettings, MetricBatch, Policy, SafetyThresholds,
    };
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct EchoProcessor {
        id: String,
        last_value: RwLock<i64>,
    }

    #[async_trait::async_trait]
    impl AdaptiveProcessor for EchoProcessor {
        fn processor_id(&self) -> &str {
            &self.id
        }

        async fn consume(&self, batch: MetricBatch) -> Result<MetricBatch, PhoenixError> {
            Ok(batch)
        }

        async fn on_config_patch(&self, patch: &ConfigPatch) -> Result<(), PhoenixError> {
            *self.last_value.write() = patch.new_value.as_i64().unwrap_or_default();
            Ok(())
        }

        fn get_config_status(&self) -> ConfigStatus {
            ConfigStatus::new(self.id.clone(), true)
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities { mutates_in_place: false, can_reject_semantic_patches: false }
        }
    }

    struct FixedTelemetry {
        kpi: String,
        value: AtomicI64,
    }

    impl TelemetrySource for FixedTelemetry {
        fn sample(&self, now: i64) -> SelfTelemetrySample {
            let mut sample = SelfTelemetrySample::new(now);
            sample.record(self.kpi.clone(), self.value.load(Ordering::Relaxed) as f64);
            sample
        }
    }

    struct StaticPolicyRepo(Arc<Policy>);

    #[async_trait::async_trait]
    impl PolicyRepository for StaticPolicyRepo {
        fn current(&self) -> Arc<Policy> {
            self.0.clone()
        }

        async fn reload(&self) -> Result<Arc<Policy>, PhoenixError> {
            Ok(self.0.clone())
        }
    }

    fn test_policy() -> Policy {
        Policy {
            processor_defaults: BTreeMap::new(),
            controllers: vec![ControllerSpec {
                name: "topk_controller".to_string(),
                kpi_name: "phoenix.topk.coverage".to_string(),
                target: 0.95,
                kp: 10.0,
                ki: 0.0,
                kd: 0.0,
                derivative_filter_alpha: 0.2,
                output_min: 10.0,
                output_max: 100.0,
                anti_windup_kaw: 1.0,
                hysteresis_percent: 0.0,
                oscillation_window: 10,
                oscillation_zero_crossing_fraction: 0.4,
                oscillation_min_duration_ticks: 3,
                oscillation_reset_duration_ticks: 4,
                bayesian_fallback_enabled: false,
                bayesian_stall_ticks: 999,
                outputs: vec![PatchProjection {
                    target_processor: "topk".to_string(),
                    parameter_path: "k_value".to_string(),
                    mapping: ProjectionMapping::Affine { base: 0.0, scale_factor: 1.0 },
                    min_value: 10.0,
                    max_value: 100.0,
                }],
            }],
            safety: SafetyThresholds {
                cpu_mcores_limit: 1000,
                rss_mib_limit: 512,
                poll_interval_ms: 1000,
                cooldown_seconds: 5,
                override_expiry_seconds: 60,
                override_factor: 2.0,
            },
            governance: GovernanceSettings {
                tick_interval_seconds: 1,
                max_patches_per_minute: 60,
                patch_cooldown_seconds: 0,
                autonomy_level: AutonomyLevel::Active,
                decision_trace_capacity: 16,
                policy_poll_interval_seconds: 5,
            },
            safe_mode_overrides: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn active_autonomy_applies_patch_to_target_processor() {
        let processor = Arc::new(EchoProcessor { id: "topk".to_string(), last_value: RwLock::new(40) });
        let registry: Arc<dyn ProcessorRegistry> =
            Arc::new(InMemoryProcessorRegistry::new(vec![processor.clone()]));
        let metrics = Arc::new(MetricsService::new().unwrap());
        let policy_repo: Arc<dyn PolicyRepository> = Arc::new(StaticPolicyRepo(Arc::new(test_policy())));
        let telemetry: Arc<dyn TelemetrySource> = Arc::new(FixedTelemetry {
            kpi: "phoenix.topk.coverage".to_string(),
            value: AtomicI64::new(0),
        });
        let safe_mode = Arc::new(SafeModeFlag::default());

        let governor = Governor::new(policy_repo, registry, metrics, telemetry, safe_mode);
        governor.run_tick(1.0).await.unwrap();

        assert_eq!(governor.decision_trace_snapshot().len(), 1);
        assert!(matches!(
            governor.decision_trace_snapshot()[0].result,
            DecisionResult::Applied
        ));
    }

    #[tokio::test]
    async fn shadow_autonomy_records_without_applying() {
        let processor = Arc::new(EchoProcessor { id: "topk".to_string(), last_value: RwLock::new(40) });
        let registry: Arc<dyn ProcessorRegistry> =
            Arc::new(InMemoryProcessorRegistry::new(vec![processor.clone()]));
        let metrics = Arc::new(MetricsService::new().unwrap());
        let mut policy = test_policy();
        policy.governance.autonomy_level = AutonomyLevel::Shadow;
        let policy_repo: Arc<dyn PolicyRepository> = Arc::new(StaticPolicyRepo(Arc::new(policy)));
        let telemetry: Arc<dyn TelemetrySource> = Arc::new(FixedTelemetry {
            kpi: "phoenix.topk.coverage".to_string(),
            value: AtomicI64::new(0),
        });
        let safe_mode = Arc::new(SafeModeFlag::default());

        let governor = Governor::new(policy_repo, registry, metrics, telemetry, safe_mode);
        governor.run_tick(1.0).await.unwrap();

        assert_eq!(*processor.last_value.read(), 40, "shadow mode must not mutate the processor");
        assert!(matches!(
            governor.decision_trace_snapshot()[0].result,
            DecisionResult::Shadowed
        ));
    }

    #[tokio::test]
    async fn subscribers_observe_patch_applied_event() {
        let processor = Arc::new(EchoProcessor { id: "topk".to_string(), last_value: RwLock::new(40) });
        let registry: Arc<dyn ProcessorRegistry> =
            Arc::new(InMemoryProcessorRegistry::new(vec![processor.clone()]));
        let metrics = Arc::new(MetricsService::new().unwrap());
        let policy_repo: Arc<dyn PolicyRepository> = Arc::new(StaticPolicyRepo(Arc::new(test_policy())));
        let telemetry: Arc<dyn TelemetrySource> = Arc::new(FixedTelemetry {
            kpi: "phoenix.topk.coverage".to_string(),
            value: AtomicI64::new(0),
        });
        let safe_mode = Arc::new(SafeModeFlag::default());

        let governor = Governor::new(policy_repo, registry, metrics, telemetry, safe_mode);
        let mut events = governor.subscribe();
        governor.run_tick(1.0).await.unwrap();

        let event = events.try_recv().expect("expected a broadcast event");
        assert!(matches!(event, GovernorEvent::PatchApplied { .. }));
    }

    #[tokio::test]
    async fn safe_mode_rejects_non_override_patches() {
        let processor = Arc::new(EchoProcessor { id: "topk".to_string(), last_value: RwLock::new(40) });
        let registry: Arc<dyn ProcessorRegistry> =
            Arc::new(InMemoryProcessorRegistry::new(vec![processor.clone()]));
        let metrics = Arc::new(MetricsService::new().unwrap());
        let policy_repo: Arc<dyn PolicyRepository> = Arc::new(StaticPolicyRepo(Arc::new(test_policy())));
        let telemetry: Arc<dyn TelemetrySource> = Arc::new(FixedTelemetry {
            kpi: "phoenix.topk.coverage".to_string(),
            value: AtomicI64::new(0),
        });
        let safe_mode = Arc::new(SafeModeFlag::default());
        safe_mode.set(true);

        let governor = Governor::new(policy_repo, registry, metrics, telemetry, safe_mode);
        governor.run_tick(1.0).await.unwrap();

        assert_eq!(*processor.last_value.read(), 40);
        assert!(matches!(
            governor.decision_trace_snapshot()[0].result,
            DecisionResult::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn repeated_patch_id_is_a_no_op() {
        let processor = Arc::new(EchoProcessor { id: "topk".to_string(), last_value: RwLock::new(40) });
        let registry: Arc<dyn ProcessorRegistry> =
            Arc::new(InMemoryProcessorRegistry::new(vec![processor.clone()]));
        let metrics = Arc::new(MetricsService::new().unwrap());
        let policy_repo: Arc<dyn PolicyRepository> = Arc::new(StaticPolicyRepo(Arc::new(test_policy())));
        let telemetry: Arc<dyn TelemetrySource> = Arc::new(FixedTelemetry {
            kpi: "phoenix.topk.coverage".to_string(),
            value: AtomicI64::new(0),
        });
        let safe_mode = Arc::new(SafeModeFlag::default());
        let governor = Governor::new(policy_repo.clone(), registry, metrics, telemetry, safe_mode);

        let patch = ConfigPatch::new(
            "topk",
            "k_value",
            PatchValue::Int(55),
            "operator override",
            PatchSeverity::Normal,
            PatchSource::Operator,
            0,
        );
        governor.validate_apply_record(&policy_repo.current(), patch.clone(), 0, 1).await;
        governor.validate_apply_record(&policy_repo.current(), patch, 1, 2).await;

        assert_eq!(governor.decision_trace_snapshot().len(), 1, "the repeat must not be recorded again");
        assert_eq!(*processor.last_value.read(), 55);
    }
}
