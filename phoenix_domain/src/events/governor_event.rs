//! Structured events emitted by the governor and safety monitor for logging
//! and diagnostics correlation.

use crate::value_objects::config_patch::ConfigPatch;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GovernorEvent {
    /// A controller's KPI was not present in the self-telemetry sample this
    /// tick; the controller was skipped.
    KpiMissing { controller: String, kpi_name: String },
    /// A patch was validated and handed to `apply` under the active
    /// autonomy level.
    PatchApplied { patch: ConfigPatch },
    /// A patch failed validation, cooldown, rate-limit, or safe-mode checks.
    PatchRejected { patch: ConfigPatch, reason: String },
    /// Policy hot-reload succeeded.
    PolicyReloaded,
    /// Policy hot-reload failed; the last-known-good policy is retained.
    PolicyReloadFailed { reason: String },
    /// The safety monitor entered safe mode.
    SafeModeEntered { reason: String },
    /// The safety monitor exited safe mode, restoring prior parameters.
    SafeModeExited,
}
