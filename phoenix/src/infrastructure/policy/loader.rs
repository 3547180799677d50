//! `FilePolicyRepository`: loads a [`Policy`] document from YAML and
//! hot-reloads it on modification-time change, retaining the last-known-good
//! document whenever a reload fails validation or parsing.

use super::schema;
use crate::infrastructure::metrics::MetricsService;
use async_trait::async_trait;
use parking_lot::RwLock;
use phoenix_domain::events::GovernorEvent;
use phoenix_domain::repositories::PolicyRepository;
use phoenix_domain::value_objects::Policy;
use phoenix_domain::PhoenixError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Capacity of the repository's `GovernorEvent` broadcast channel. Only
/// `PolicyReloaded`/`PolicyReloadFailed` are ever sent here.
const EVENT_CHANNEL_CAPACITY: usize = 16;

fn parse_and_validate(contents: &str) -> Result<Policy, PhoenixError> {
    let policy: Policy = serde_yaml::from_str(contents)
        .map_err(|e| PhoenixError::config(format!("failed to parse policy yaml: {e}")))?;
    schema::validate(&policy)?;
    Ok(policy)
}

pub struct FilePolicyRepository {
    path: PathBuf,
    current: RwLock<Arc<Policy>>,
    last_modified: RwLock<Option<SystemTime>>,
    metrics: Arc<MetricsService>,
    events: broadcast::Sender<GovernorEvent>,
}

impl FilePolicyRepository {
    /// Loads and validates the policy at `path`, failing fast: there is no
    /// last-known-good document to fall back to before the first load.
    /// `metrics` is the same registry the rest of the runtime publishes to,
    /// so `policy_reload_{success,failed}_total` land alongside every other
    /// governor counter.
    pub fn load(path: impl Into<PathBuf>, metrics: Arc<MetricsService>) -> Result<Self, PhoenixError> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| PhoenixError::config(format!("failed to read policy file {path:?}: {e}")))?;
        let policy = parse_and_validate(&contents)?;
        let last_modified = std::fs::metadata(&path).ok().and_then(|m| m.modified().ok());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(policy)),
            last_modified: RwLock::new(last_modified),
            metrics,
            events,
        })
    }

    /// Subscribes to this repository's `PolicyReloaded`/`PolicyReloadFailed`
    /// events. Diagnostic only.
    pub fn subscribe(&self) -> broadcast::Receiver<GovernorEvent> {
        self.events.subscribe()
    }

    /// Reloads only if the file's modification time advanced since the last
    /// successful load, returning `true` when a reload was attempted. Meant
    /// to be called from a periodic background task.
    pub async fn poll_for_changes(&self) -> Result<bool, PhoenixError> {
        let modified = std::fs::metadata(&self.path).ok().and_then(|m| m.modified().ok());
        let changed = match (modified, *self.last_modified.read()) {
            (Some(m), Some(last)) => m > last,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !changed {
            return Ok(false);
        }
        self.reload().await?;
        *self.last_modified.write() = modified;
        Ok(true)
    }
}

#[async_trait]
impl PolicyRepository for FilePolicyRepository {
    fn current(&self) -> Arc<Policy> {
        self.current.read().clone()
    }

    async fn reload(&self) -> Result<Arc<Policy>, PhoenixError> {
        match std::fs::read_to_string(&self.path).map_err(|e| {
            PhoenixError::config(format!("failed to read policy file {:?}: {e}", self.path))
        }) {
            Ok(contents) => match parse_and_validate(&contents) {
                Ok(policy) => {
                    let policy = Arc::new(policy);
                    *self.current.write() = policy.clone();
                    info!(path = ?self.path, "policy reloaded");
                    self.metrics.inc_policy_reload_success();
                    let _ = self.events.send(GovernorEvent::PolicyReloaded);
                    Ok(policy)
                }
                Err(err) => {
                    warn!(path = ?self.path, error = %err, "policy reload failed, retaining last-known-good");
                    self.metrics.inc_policy_reload_failed();
                    let _ = self.events.send(GovernorEvent::PolicyReloadFailed { reason: err.to_string() });
                    Err(err)
                }
            },
            Err(err) => {
                warn!(path = ?self.path, error = %err, "policy file unreadable, retaining last-known-good");
                self.metrics.inc_policy_reload_failed();
                let _ = self.events.send(GovernorEvent::PolicyReloadFailed { reason: err.to_string() });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn minimal_yaml() -> &'static str {
        r#"
processor_defaults: {}
controllers: []
safety:
  cpu_mcores_limit: 1000
  rss_mib_limit: 512
  poll_interval_ms: 1000
  cooldown_seconds: 5
  override_expiry_seconds: 60
  override_factor: 2.0
governance:
  tick_interval_seconds: 1
  max_patches_per_minute: 60
  patch_cooldown_seconds: 1
  autonomy_level: active
  decision_trace_capacity: 16
safe_mode_overrides: {}
"#
    }

    fn scratch_path() -> PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("phoenix_policy_loader_test_{id}.yaml"))
    }

    fn test_metrics() -> Arc<MetricsService> {
        Arc::new(MetricsService::new().unwrap())
    }

    #[tokio::test]
    async fn loads_valid_policy_file() {
        let path = scratch_path();
        std::fs::write(&path, minimal_yaml()).unwrap();
        let repo = FilePolicyRepository::load(&path, test_metrics()).unwrap();
        assert_eq!(repo.current().governance.max_patches_per_minute, 60);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn rejects_unknown_top_level_key() {
        let path = scratch_path();
        let mut yaml = minimal_yaml().to_string();
        yaml.push_str("not_a_real_key: 1\n");
        std::fs::write(&path, yaml).unwrap();
        assert!(FilePolicyRepository::load(&path, test_metrics()).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn rejects_typo_in_governance_section() {
        let path = scratch_path();
        let yaml = minimal_yaml().replace("max_patches_per_minute", "max_patches_per_minuet");
        std::fs::write(&path, yaml).unwrap();
        assert!(FilePolicyRepository::load(&path, test_metrics()).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn reload_retains_last_known_good_on_invalid_yaml() {
        let path = scratch_path();
        std::fs::write(&path, minimal_yaml()).unwrap();
        let repo = FilePolicyRepository::load(&path, test_metrics()).unwrap();

        std::fs::write(&path, "not: valid: policy: yaml: [").unwrap();
        let result = repo.reload().await;
        assert!(result.is_err());
        assert_eq!(repo.current().governance.max_patches_per_minute, 60);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn reload_success_increments_metrics_and_emits_event() {
        let path = scratch_path();
        std::fs::write(&path, minimal_yaml()).unwrap();
        let metrics = test_metrics();
        let repo = FilePolicyRepository::load(&path, metrics.clone()).unwrap();
        let mut events = repo.subscribe();

        // advance mtime deterministically; poll_for_changes compares SystemTime
        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(&path, minimal_yaml()).unwrap();
        assert!(repo.poll_for_changes().await.unwrap());

        let text = metrics.get_metrics().unwrap();
        assert!(text.contains("phoenix_policy_reload_success_total 1"));
        assert!(matches!(events.try_recv().unwrap(), GovernorEvent::PolicyReloaded));
        std::fs::remove_file(&path).ok();
    }
}
