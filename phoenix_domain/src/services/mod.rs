pub mod adaptive_processor;
pub mod pid_controller;
pub mod sketches;

pub use adaptive_processor::{AdaptiveProcessor, Capabilities};
pub use pid_controller::{PidConfig, PidController};
