pub mod safety_monitor;

pub use safety_monitor::{SafeModeFlag, SafetyMonitor};
