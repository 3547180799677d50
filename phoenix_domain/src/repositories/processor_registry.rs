//! `ProcessorRegistry`: resolves a `(processor-id, parameter-path)` pair to
//! the processor that owns it, the way `StageExecutor` resolves a stage
//! name to its `StageService` implementation. Kept as a narrow domain trait
//! so the governor depends on an abstraction, not on the concrete registry
//! implementation infrastructure provides.

use crate::error::PhoenixError;
use crate::services::AdaptiveProcessor;
use crate::value_objects::{ConfigPatch, ConfigStatus};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ProcessorRegistry: Send + Sync {
    /// Looks up a processor by id, or `None` if unregistered. Used for
    /// patch validation (spec §4.9 step 4: reject patches whose target
    /// processor is unknown).
    fn get(&self, processor_id: &str) -> Option<Arc<dyn AdaptiveProcessor>>;

    /// All registered processor ids, in pipeline order.
    fn processor_ids(&self) -> Vec<String>;

    /// Applies `patch` to its target, returning the processor's error if
    /// rejected. A convenience wrapper over `get` + `on_config_patch` used
    /// by the governor's `apply` step.
    async fn apply_patch(&self, patch: &ConfigPatch) -> Result<(), PhoenixError> {
        let processor = self
            .get(&patch.target_processor)
            .ok_or_else(|| PhoenixError::UnknownParameter(
                patch.parameter_path.clone(),
                patch.target_processor.clone(),
            ))?;
        processor.on_config_patch(patch).await
    }

    /// Snapshots every registered processor's config status, in pipeline
    /// order, for `dump-status`.
    fn snapshot_all(&self) -> Vec<ConfigStatus> {
        self.processor_ids()
            .iter()
            .filter_map(|id| self.get(id))
            .map(|p| p.get_config_status())
            .collect()
    }
}
