pub mod hyperloglog;
pub mod reservoir;
pub mod space_saving;

pub use hyperloglog::HyperLogLog;
pub use reservoir::Reservoir;
pub use space_saving::SpaceSaving;
