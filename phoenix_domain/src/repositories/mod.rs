pub mod policy_repository;
pub mod processor_registry;

pub use policy_repository::PolicyRepository;
pub use processor_registry::ProcessorRegistry;
