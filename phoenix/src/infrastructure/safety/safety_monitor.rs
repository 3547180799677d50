//! `SafetyMonitor`: polls process CPU and memory, forces safe mode under
//! pressure, and tracks time-boxed `safety_override` patches. Runs as its
//! own cooperative task alongside the governor (spec §4.10).

use crate::infrastructure::metrics::MetricsService;
use chrono::Utc;
use parking_lot::RwLock;
use phoenix_domain::events::GovernorEvent;
use phoenix_domain::repositories::ProcessorRegistry;
use phoenix_domain::value_objects::{ConfigPatch, ConfigStatus, PatchSeverity, PatchSource, Policy};
use phoenix_domain::PhoenixError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sysinfo::{Pid, System};
use tokio::sync::broadcast;
use tracing::{info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A currently active `safety_override`: while unexpired it raises the
/// monitor's effective limits by `policy.safety.override_factor`.
struct ActiveOverride {
    expires_at_unix: i64,
}

/// Shared safe-mode flag, read by the governor to gate non-safety patches
/// without taking a lock on the monitor itself.
#[derive(Default)]
pub struct SafeModeFlag(AtomicBool);

impl SafeModeFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, value: bool) {
        self.0.store(value, Ordering::Release);
    }
}

pub struct SafetyMonitor {
    registry: Arc<dyn ProcessorRegistry>,
    metrics: Arc<MetricsService>,
    safe_mode: Arc<SafeModeFlag>,
    system: RwLock<System>,
    pid: Pid,
    below_limits_since: RwLock<Option<i64>>,
    above_limits_since: RwLock<Option<i64>>,
    pre_safe_mode_snapshot: RwLock<Option<Vec<ConfigStatus>>>,
    active_overrides: RwLock<HashMap<String, ActiveOverride>>,
    events: broadcast::Sender<GovernorEvent>,
}

impl SafetyMonitor {
    pub fn new(registry: Arc<dyn ProcessorRegistry>, metrics: Arc<MetricsService>) -> Self {
        let pid = Pid::from_u32(std::process::id());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry,
            metrics,
            safe_mode: Arc::new(SafeModeFlag::default()),
            system: RwLock::new(System::new()),
            pid,
            below_limits_since: RwLock::new(None),
            above_limits_since: RwLock::new(None),
            pre_safe_mode_snapshot: RwLock::new(None),
            active_overrides: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// The flag the governor reads to decide whether non-safety patches
    /// must be rejected this tick.
    pub fn safe_mode_flag(&self) -> Arc<SafeModeFlag> {
        self.safe_mode.clone()
    }

    /// Subscribes to safe-mode entry/exit events.
    pub fn subscribe(&self) -> broadcast::Receiver<GovernorEvent> {
        self.events.subscribe()
    }

    /// Registers a time-boxed override: while active, effective limits are
    /// `policy.safety.override_factor` times the declared ones. Hard safety
    /// invariants (the limits themselves) are never lifted past this
    /// factor, only scaled by it.
    pub fn register_override(&self, patch: &ConfigPatch, now_unix: i64, expiry_seconds: u64) {
        self.active_overrides.write().insert(
            patch.patch_id.clone(),
            ActiveOverride {
                expires_at_unix: now_unix + expiry_seconds as i64,
            },
        );
    }

    fn prune_expired_overrides(&self, now_unix: i64) {
        self.active_overrides
            .write()
            .retain(|_, o| o.expires_at_unix > now_unix);
    }

    fn active_override_factor(&self, policy: &Policy, now_unix: i64) -> f64 {
        self.prune_expired_overrides(now_unix);
        if self.active_overrides.read().is_empty() {
            1.0
        } else {
            policy.safety.override_factor
        }
    }

    /// One poll cycle: reads current CPU/RSS, updates safe-mode state,
    /// records self-telemetry. Call on `policy.safety.poll_interval_ms`.
    pub async fn poll_once(&self, policy: &Policy) -> Result<(), PhoenixError> {
        let now_unix = Utc::now().timestamp();
        let overrides_active = {
            self.prune_expired_overrides(now_unix);
            self.active_overrides.read().len()
        };
        let factor = self.active_override_factor(policy, now_unix);

        let reading = {
            let mut system = self.system.write();
            system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]), true);
            system.process(self.pid).map(|p| (p.cpu_usage(), p.memory()))
        };

        let (cpu_mcores, rss_mib) = match reading {
            Some((cpu_percent, rss_bytes)) => (
                (cpu_percent as f64) * 10.0,
                rss_bytes as f64 / (1024.0 * 1024.0),
            ),
            None => {
                warn!("safety monitor could not read process usage; assuming safe mode");
                self.enter_safe_mode(policy, "process usage unreadable").await?;
                self.metrics.set_safety_status(true, 0.0, 0.0, overrides_active as f64);
                return Ok(());
            }
        };

        self.metrics.set_safety_status(
            self.safe_mode.is_set(),
            cpu_mcores,
            rss_mib,
            overrides_active as f64,
        );

        let cpu_limit = policy.safety.cpu_mcores_limit as f64 * factor;
        let rss_limit = policy.safety.rss_mib_limit as f64 * factor;
        let breached = cpu_mcores > cpu_limit || rss_mib > rss_limit;

        if breached {
            *self.below_limits_since.write() = None;
            if !self.safe_mode.is_set() {
                let mut since = self.above_limits_since.write();
                let first_breach = *since.get_or_insert(now_unix);
                drop(since);
                if now_unix - first_breach >= 0 {
                    self.enter_safe_mode(
                        policy,
                        &format!("cpu={cpu_mcores:.0}mc rss={rss_mib:.0}MiB exceeded limits"),
                    )
                    .await?;
                }
            }
        } else {
            *self.above_limits_since.write() = None;
            if self.safe_mode.is_set() {
                let mut since = self.below_limits_since.write();
                let first_ok = *since.get_or_insert(now_unix);
                let elapsed = now_unix - first_ok;
                drop(since);
                if elapsed >= policy.safety.cooldown_seconds as i64 {
                    self.exit_safe_mode().await?;
                }
            }
        }

        Ok(())
    }

    /// Forces safe-mode entry outside the normal CPU/RSS poll, for the
    /// `force-safe-mode` CLI command's `safety_override` patch.
    pub async fn force_enter(&self, policy: &Policy, reason: &str) -> Result<(), PhoenixError> {
        self.enter_safe_mode(policy, reason).await
    }

    /// Forces safe-mode exit, for the `exit-safe-mode` CLI command.
    pub async fn force_exit(&self) -> Result<(), PhoenixError> {
        self.exit_safe_mode().await
    }

    async fn enter_safe_mode(&self, policy: &Policy, reason: &str) -> Result<(), PhoenixError> {
        if self.safe_mode.is_set() {
            return Ok(());
        }
        info!(reason, "entering safe mode");
        *self.pre_safe_mode_snapshot.write() = Some(self.registry.snapshot_all());
        self.safe_mode.set(true);
        let _ = self.events.send(GovernorEvent::SafeModeEntered { reason: reason.to_string() });

        let now_unix = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        for (processor_id, params) in &policy.safe_mode_overrides {
            for (parameter_path, value) in params {
                let patch = ConfigPatch::new(
                    processor_id.clone(),
                    parameter_path.clone(),
                    value.clone(),
                    "safe mode entry override",
                    PatchSeverity::Safety,
                    PatchSource::Safety,
                    now_unix,
                );
                if let Err(err) = self.registry.apply_patch(&patch).await {
                    warn!(processor = %processor_id, error = %err, "safe-mode override rejected");
                }
            }
        }
        Ok(())
    }

    async fn exit_safe_mode(&self) -> Result<(), PhoenixError> {
        info!("exiting safe mode, restoring prior parameters");
        let snapshot = self.pre_safe_mode_snapshot.write().take();
        self.safe_mode.set(false);
        *self.below_limits_since.write() = None;
        let _ = self.events.send(GovernorEvent::SafeModeExited);

        if let Some(statuses) = snapshot {
            let now_unix = Utc::now().timestamp_nanos_opt().unwrap_or_default();
            for status in statuses {
                for (parameter_path, value) in &status.parameters {
                    let patch = ConfigPatch::new(
                        status.processor_id.clone(),
                        parameter_path.clone(),
                        value.clone(),
                        "safe mode exit restore",
                        PatchSeverity::Safety,
                        PatchSource::Safety,
                        now_unix,
                    );
                    if let Err(err) = self.registry.apply_patch(&patch).await {
                        warn!(processor = %status.processor_id, error = %err, "safe-mode restore rejected");
                    }
                }
            }
        }
        Ok(())
    }
}
