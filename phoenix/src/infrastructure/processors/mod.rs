pub mod adaptive_topk;
pub mod cardinality_guardian;
pub mod histogram_aggregator;
pub mod others_rollup;
pub mod priority_tagger;
pub mod reservoir_sampler;

pub use adaptive_topk::AdaptiveTopK;
pub use cardinality_guardian::CardinalityGuardian;
pub use histogram_aggregator::HistogramAggregator;
pub use others_rollup::{OthersRollup, Strategy as RollupStrategy};
pub use priority_tagger::PriorityTagger;
pub use reservoir_sampler::ReservoirSampler;
