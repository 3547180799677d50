//! Validation rules applied to a freshly parsed [`Policy`] document before
//! it becomes the active, last-known-good policy.

use phoenix_domain::value_objects::Policy;
use phoenix_domain::PhoenixError;

/// Checks structural invariants `serde` alone cannot express: bound
/// ordering, positive thresholds, and non-empty controller names.
pub fn validate(policy: &Policy) -> Result<(), PhoenixError> {
    for controller in &policy.controllers {
        if controller.name.is_empty() {
            return Err(PhoenixError::config("controller name must not be empty"));
        }
        if controller.output_min >= controller.output_max {
            return Err(PhoenixError::config(format!(
                "controller '{}': output_min must be < output_max",
                controller.name
            )));
        }
        if !(0.0..=1.0).contains(&controller.derivative_filter_alpha) {
            return Err(PhoenixError::config(format!(
                "controller '{}': derivative_filter_alpha must be in [0, 1]",
                controller.name
            )));
        }
        for output in &controller.outputs {
            if output.min_value >= output.max_value {
                return Err(PhoenixError::config(format!(
                    "controller '{}' output on '{}.{}': min_value must be < max_value",
                    controller.name, output.target_processor, output.parameter_path
                )));
            }
            if output.target_processor.is_empty() || output.parameter_path.is_empty() {
                return Err(PhoenixError::config(format!(
                    "controller '{}': output projection missing target_processor or parameter_path",
                    controller.name
                )));
            }
        }
    }

    if policy.safety.cpu_mcores_limit == 0 {
        return Err(PhoenixError::config("safety.cpu_mcores_limit must be > 0"));
    }
    if policy.safety.rss_mib_limit == 0 {
        return Err(PhoenixError::config("safety.rss_mib_limit must be > 0"));
    }
    if policy.safety.override_factor < 1.0 {
        return Err(PhoenixError::config("safety.override_factor must be >= 1.0"));
    }

    if policy.governance.max_patches_per_minute == 0 {
        return Err(PhoenixError::config("governance.max_patches_per_minute must be > 0"));
    }
    if policy.governance.policy_poll_interval_seconds == 0 {
        return Err(PhoenixError::config("governance.policy_poll_interval_seconds must be > 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoenix_domain::value_objects::{
        AutonomyLevel, ControllerSpec, GovernanceSettings, PatchProjection, ProjectionMapping,
        SafetyThresholds,
    };
    use std::collections::BTreeMap;

    fn base_policy() -> Policy {
        Policy {
            processor_defaults: BTreeMap::new(),
            controllers: vec![ControllerSpec {
                name: "topk_controller".to_string(),
                kpi_name: "phoenix.topk.coverage".to_string(),
                target: 0.95,
                kp: 10.0,
                ki: 0.1,
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
                bayesian_stall_ticks: 20,
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
                patch_cooldown_seconds: 1,
                autonomy_level: AutonomyLevel::Active,
                decision_trace_capacity: 16,
                policy_poll_interval_seconds: 5,
            },
            safe_mode_overrides: BTreeMap::new(),
        }
    }

    #[test]
    fn valid_policy_passes() {
        assert!(validate(&base_policy()).is_ok());
    }

    #[test]
    fn rejects_inverted_output_bounds() {
        let mut policy = base_policy();
        policy.controllers[0].output_min = 100.0;
        policy.controllers[0].output_max = 10.0;
        assert!(validate(&policy).is_err());
    }

    #[test]
    fn rejects_zero_cpu_limit() {
        let mut policy = base_policy();
        policy.safety.cpu_mcores_limit = 0;
        assert!(validate(&policy).is_err());
    }
}
