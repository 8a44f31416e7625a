//! Data-source boundary.
//!
//! - [`source`]: FeatureSource trait, bounding-box query/response types
//! - [`coordinator`]: Single-in-flight request coordination with
//!   generation-numbered cancellation

pub mod coordinator;
pub mod source;
