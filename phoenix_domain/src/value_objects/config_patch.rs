//! `ConfigPatch`: the single directive type by which the governor, the
//! safety monitor, and operators change one tunable parameter of one
//! processor.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a patch, used by validation and by logging correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchSeverity {
    Normal,
    Urgent,
    Safety,
}

/// Who produced the patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchSource {
    Pid,
    Bayesian,
    Operator,
    Safety,
}

/// A tagged scalar. Covers every `new_value` shape a patch can carry,
/// including the rule-list replacement `PriorityTagger` needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PatchValue {
    Int(i64),
    Double(f64),
    Bool(bool),
    String(String),
    RuleArray(Vec<PriorityRule>),
}

impl PatchValue {
    /// Attempts numeric coercion between integer and floating point, as
    /// required by the `AdaptiveProcessor` contract ("numeric values must
    /// interconvert between integer and floating point where semantically
    /// lossless").
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_rules(&self) -> Option<&[PriorityRule]> {
        match self {
            Self::RuleArray(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

/// One `{regex, priority}` rule used by `PriorityTagger`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityRule {
    pub pattern: String,
    pub priority: crate::value_objects::priority_level::PriorityLevel,
}

/// A directive to change one tunable parameter of one processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub patch_id: String,
    pub target_processor: String,
    pub parameter_path: String,
    pub new_value: PatchValue,
    pub reason: String,
    pub severity: PatchSeverity,
    pub source: PatchSource,
    pub timestamp_unix_nanos: i64,
    pub ttl_seconds: Option<u64>,
    pub safety_override: bool,
}

impl ConfigPatch {
    /// Builds a patch with a freshly generated `patch_id`, suitable for
    /// patches the governor originates itself (`source` other than
    /// `operator`, which is expected to supply its own id for idempotence).
    pub fn new(
        target_processor: impl Into<String>,
        parameter_path: impl Into<String>,
        new_value: PatchValue,
        reason: impl Into<String>,
        severity: PatchSeverity,
        source: PatchSource,
        timestamp_unix_nanos: i64,
    ) -> Self {
        Self {
            patch_id: Uuid::new_v4().to_string(),
            target_processor: target_processor.into(),
            parameter_path: parameter_path.into(),
            new_value,
            reason: reason.into(),
            severity,
            source,
            timestamp_unix_nanos,
            ttl_seconds: None,
            safety_override: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_value_coerces_int_to_float() {
        let v = PatchValue::Int(5);
        assert_eq!(v.as_f64(), Some(5.0));
    }

    #[test]
    fn patch_value_coerces_whole_float_to_int() {
        let v = PatchValue::Double(5.0);
        assert_eq!(v.as_i64(), Some(5));
    }

    #[test]
    fn patch_value_refuses_fractional_to_int() {
        let v = PatchValue::Double(5.5);
        assert_eq!(v.as_i64(), None);
    }

    #[test]
    fn patches_from_new_have_unique_ids() {
        let a = ConfigPatch::new(
            "topk",
            "k_value",
            PatchValue::Int(40),
            "pid",
            PatchSeverity::Normal,
            PatchSource::Pid,
            0,
        );
        let b = ConfigPatch::new(
            "topk",
            "k_value",
            PatchValue::Int(40),
            "pid",
            PatchSeverity::Normal,
            PatchSource::Pid,
            0,
        );
        assert_ne!(a.patch_id, b.patch_id);
    }
}
