pub mod self_telemetry;

pub use self_telemetry::SelfTelemetrySample;
