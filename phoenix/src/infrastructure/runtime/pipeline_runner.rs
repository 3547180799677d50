//! `PipelineRunner`: drives a `MetricBatch` through the ordered chain of
//! `AdaptiveProcessor` stages. Stage-to-stage handoff is a direct call under
//! the caller's thread; no queueing between stages.

use super::registry::InMemoryProcessorRegistry;
use phoenix_domain::value_objects::MetricBatch;
use phoenix_domain::PhoenixError;
use std::sync::Arc;
use tracing::{error, instrument};

pub struct PipelineRunner {
    registry: Arc<InMemoryProcessorRegistry>,
}

impl PipelineRunner {
    pub fn new(registry: Arc<InMemoryProcessorRegistry>) -> Self {
        Self { registry }
    }

    /// Calls `start` on every processor, in pipeline order.
    pub async fn start(&self) -> Result<(), PhoenixError> {
        for processor in self.registry.ordered() {
            processor.start().await?;
        }
        Ok(())
    }

    /// Drives one batch through every stage in order, forwarding exactly
    /// one batch to the next. A processor's `InvariantViolation` is fatal
    /// and is propagated; any other error is logged and the batch continues
    /// unmodified into the next stage (self-telemetry counters already
    /// reflect the failure via the processor's own instrumentation).
    #[instrument(skip(self, batch))]
    pub async fn process_batch(&self, mut batch: MetricBatch) -> Result<MetricBatch, PhoenixError> {
        for processor in self.registry.ordered() {
            match processor.consume(batch.clone()).await {
                Ok(next) => batch = next,
                Err(err @ PhoenixError::InvariantViolation(_)) => return Err(err),
                Err(err) => {
                    error!(processor = processor.processor_id(), error = %err, "stage consume failed");
                }
            }
        }
        Ok(batch)
    }

    /// Calls `shutdown` on every processor in reverse pipeline order, after
    /// the current batch has left the last stage.
    pub async fn shutdown(&self) -> Result<(), PhoenixError> {
        for processor in self.registry.ordered().into_iter().rev() {
            processor.shutdown().await?;
        }
        Ok(())
    }
}
