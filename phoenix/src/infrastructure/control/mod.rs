pub mod bayesian_fallback;
pub mod governor;

pub use bayesian_fallback::BayesianFallback;
pub use governor::{Governor, MetricsTelemetrySource, TelemetrySource};
