//! Central analysis.
//!
//! Cross-organization aggregation and the t distribution it relies on.

pub mod aggregator;
pub mod distribution;

pub use aggregator::Aggregator;
