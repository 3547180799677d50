pub mod control;
pub mod logging;
pub mod metrics;
pub mod policy;
pub mod processors;
pub mod runtime;
pub mod safety;

pub use logging::init_tracing;
