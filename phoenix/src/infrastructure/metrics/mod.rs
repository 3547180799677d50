pub mod service;

pub use service::MetricsService;
