//! `force-safe-mode` CLI command: sends an operator-originated
//! `safety_override` directive that forces safe-mode entry regardless of
//! current CPU/RSS readings.

use crate::infrastructure::safety::SafetyMonitor;
use phoenix_domain::repositories::PolicyRepository;
use phoenix_domain::PhoenixError;

pub async fn force_safe_mode(
    safety_monitor: &SafetyMonitor,
    policy_repo: &dyn PolicyRepository,
) -> Result<(), PhoenixError> {
    safety_monitor
        .force_enter(&policy_repo.current(), "operator forced safe mode")
        .await
}
