//! The `Policy` document: per-processor defaults, controller specs, safety
//! thresholds and governance settings. Loaded at startup and optionally
//! hot-reloaded by the infrastructure layer; this module only defines the
//! validated shape, not the loading mechanism.

use crate::value_objects::config_patch::PatchValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyLevel {
    Shadow,
    Advisory,
    Active,
}

fn default_policy_poll_interval_seconds() -> u64 {
    5
}

/// One declared controller: which KPI it watches, its PID gains, and the
/// output projection table mapping `u` onto one or more `ConfigPatch`es.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerSpec {
    pub name: String,
    pub kpi_name: String,
    pub target: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub derivative_filter_alpha: f64,
    pub output_min: f64,
    pub output_max: f64,
    pub anti_windup_kaw: f64,
    pub hysteresis_percent: f64,
    pub oscillation_window: usize,
    pub oscillation_zero_crossing_fraction: f64,
    pub oscillation_min_duration_ticks: u32,
    pub oscillation_reset_duration_ticks: u32,
    pub bayesian_fallback_enabled: bool,
    pub bayesian_stall_ticks: u32,
    pub outputs: Vec<PatchProjection>,
}

/// One entry of a controller's `output_config_patches` table: maps the
/// controller's scalar output onto a patch for a specific processor
/// parameter, either by an affine transform or a value map for non-numeric
/// parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchProjection {
    pub target_processor: String,
    pub parameter_path: String,
    #[serde(flatten)]
    pub mapping: ProjectionMapping,
    pub min_value: f64,
    pub max_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProjectionMapping {
    /// `new_value = clamp(base + scale_factor * u, min_value, max_value)`
    Affine { base: f64, scale_factor: f64 },
    /// Piece-wise map for non-numeric parameters: `u` is bucketed into the
    /// nearest breakpoint and the corresponding value substituted.
    ValueMap { breakpoints: Vec<(f64, PatchValue)> },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyThresholds {
    pub cpu_mcores_limit: u64,
    pub rss_mib_limit: u64,
    pub poll_interval_ms: u64,
    pub cooldown_seconds: u64,
    pub override_expiry_seconds: u64,
    pub override_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GovernanceSettings {
    pub tick_interval_seconds: u64,
    pub max_patches_per_minute: u32,
    pub patch_cooldown_seconds: u64,
    pub autonomy_level: AutonomyLevel,
    pub decision_trace_capacity: usize,
    /// How often the policy file's modification time is polled for changes
    /// (spec: "Hot-reload is detected by modification-time polling, interval
    /// configurable").
    #[serde(default = "default_policy_poll_interval_seconds")]
    pub policy_poll_interval_seconds: u64,
}

/// The fully validated policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    /// Per-processor default parameter values, keyed by processor id.
    pub processor_defaults: BTreeMap<String, BTreeMap<String, PatchValue>>,
    pub controllers: Vec<ControllerSpec>,
    pub safety: SafetyThresholds,
    pub governance: GovernanceSettings,
    /// Pre-declared parameter overrides applied to every registered
    /// processor on safe-mode entry (e.g. `topk.k_value` -> `k_min`).
    #[serde(default)]
    pub safe_mode_overrides: BTreeMap<String, BTreeMap<String, PatchValue>>,
}
