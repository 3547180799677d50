pub mod bounded_param;
pub mod config_patch;
pub mod config_status;
pub mod metric_batch;
pub mod policy;
pub mod priority_level;

pub use bounded_param::BoundedParam;
pub use config_patch::{ConfigPatch, PatchSeverity, PatchSource, PatchValue, PriorityRule};
pub use config_status::ConfigStatus;
pub use metric_batch::{
    DataPoint, DataPointValue, HistogramBucket, HistogramValue, Metric, MetricBatch, MetricType,
    NumericValue, ResourceMetrics,
};
pub use policy::{
    AutonomyLevel, ControllerSpec, GovernanceSettings, PatchProjection, Policy,
    ProjectionMapping, SafetyThresholds,
};
pub use priority_level::PriorityLevel;
