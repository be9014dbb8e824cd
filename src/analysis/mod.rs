//! Aggregates derived from a (filtered) dataset for presentation layers.
//!
//! Every function here is a pure function of its inputs; results are plain
//! serializable values with no rendering concerns.

pub mod aggregator;
pub mod metrics;
