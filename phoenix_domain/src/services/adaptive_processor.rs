//! The unified trait every stage in the data pipeline implements, whether
//! built-in (`PriorityTagger`, `AdaptiveTopK`, ...) or a future custom
//! stage. Mirrors the role `StageService` plays for the pipeline this
//! workspace's layering is adapted from: one interface, uniform dispatch,
//! no per-stage special-casing in the runner.

use crate::error::PhoenixError;
use crate::value_objects::{ConfigPatch, ConfigStatus, MetricBatch};
use async_trait::async_trait;

/// Capabilities a processor declares so the runner and diagnostics can
/// reason about it without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether `consume` mutates the batch in place rather than copying.
    pub mutates_in_place: bool,
    /// Whether this processor can ever reject a config patch for reasons
    /// beyond bounds/type (e.g. `PriorityTagger` rejecting an invalid
    /// regex).
    pub can_reject_semantic_patches: bool,
}

/// Every stage in the data pipeline: `Consume`, `OnConfigPatch`,
/// `GetConfigStatus`, `Start`, `Shutdown`, `Capabilities`.
///
/// Implementations must serialize `on_config_patch` with `consume` so a
/// batch observes either the pre-patch or post-patch configuration, never a
/// partial update — typically by holding processor state behind a
/// `parking_lot::RwLock` or by construction as a single-threaded actor.
#[async_trait]
pub trait AdaptiveProcessor: Send + Sync {
    /// Stable identity used as `target_processor` in patches and as the
    /// `phoenix.<processor>.*` telemetry namespace prefix.
    fn processor_id(&self) -> &str;

    /// Consumes one batch, forwarding exactly one batch onward (which may
    /// be empty). May mutate `batch` in place or return a replacement,
    /// depending on `Capabilities::mutates_in_place`.
    async fn consume(&self, batch: MetricBatch) -> Result<MetricBatch, PhoenixError>;

    /// Applies one config patch. Must either fully apply the change and
    /// return `Ok(())`, or return an error with no state change — partial
    /// application is never permitted. Patches targeting unknown parameters
    /// or carrying incompatible types must fail here, not panic.
    async fn on_config_patch(&self, patch: &ConfigPatch) -> Result<(), PhoenixError>;

    /// Returns a snapshot of every tunable parameter plus the `enabled`
    /// flag. Safe to call concurrently with `consume`.
    fn get_config_status(&self) -> ConfigStatus;

    /// Called once before the first `consume`, in pipeline order.
    async fn start(&self) -> Result<(), PhoenixError> {
        Ok(())
    }

    /// Called once during shutdown, in reverse pipeline order, after the
    /// current batch has left the last stage.
    async fn shutdown(&self) -> Result<(), PhoenixError> {
        Ok(())
    }

    fn capabilities(&self) -> Capabilities;
}
