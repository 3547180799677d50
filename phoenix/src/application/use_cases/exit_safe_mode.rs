//! `exit-safe-mode` CLI command: forces safe-mode exit and restores the
//! parameters snapshotted on entry.

use crate::infrastructure::safety::SafetyMonitor;
use phoenix_domain::PhoenixError;

pub async fn exit_safe_mode(safety_monitor: &SafetyMonitor) -> Result<(), PhoenixError> {
    safety_monitor.force_exit().await
}
