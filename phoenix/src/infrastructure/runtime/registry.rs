//! Static dispatch table mapping processor id to its `AdaptiveProcessor`
//! implementation, in pipeline order. A reflection-style registry is
//! explicitly not required by the contract; this keeps dispatch auditable.

use async_trait::async_trait;
use phoenix_domain::repositories::ProcessorRegistry as ProcessorRegistryTrait;
use phoenix_domain::services::AdaptiveProcessor;
use std::collections::HashMap;
use std::sync::Arc;

pub struct InMemoryProcessorRegistry {
    order: Vec<String>,
    by_id: HashMap<String, Arc<dyn AdaptiveProcessor>>,
}

impl InMemoryProcessorRegistry {
    pub fn new(processors: Vec<Arc<dyn AdaptiveProcessor>>) -> Self {
        let mut order = Vec::with_capacity(processors.len());
        let mut by_id = HashMap::with_capacity(processors.len());
        for processor in processors {
            let id = processor.processor_id().to_string();
            order.push(id.clone());
            by_id.insert(id, processor);
        }
        Self { order, by_id }
    }

    /// Processors in pipeline order, used by the runner to drive `consume`.
    pub fn ordered(&self) -> Vec<Arc<dyn AdaptiveProcessor>> {
        self.order.iter().filter_map(|id| self.by_id.get(id).cloned()).collect()
    }
}

#[async_trait]
impl ProcessorRegistryTrait for InMemoryProcessorRegistry {
    fn get(&self, processor_id: &str) -> Option<Arc<dyn AdaptiveProcessor>> {
        self.by_id.get(processor_id).cloned()
    }

    fn processor_ids(&self) -> Vec<String> {
        self.order.clone()
    }
}
