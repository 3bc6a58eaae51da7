//! The aggregation pipeline: per-simulation extraction, experiment-level
//! consolidation, and baseline-relative reduction.

pub mod aggregator;
pub mod extract;
pub mod reduce;

pub use aggregator::Aggregator;
pub use extract::{build_extractor, Extractor};
pub use reduce::{reduce, RateSpec, ReductionSpec};
