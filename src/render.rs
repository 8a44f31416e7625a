//! Renderer collaborator contract.
//!
//! The engine owns all cache state; the renderer only receives add/remove
//! notifications and never mutates engine state directly.

use std::sync::Arc;

use crate::cache::feature::Feature;

/// The on-screen renderer, as seen by the engine.
///
/// Implemented by the host map application. Calls arrive on the engine's
/// event-loop task, so implementations should hand work off rather than
/// block.
pub trait FeatureRenderer: Send + Sync {
    /// Newly merged features to draw.
    fn features_added(&self, features: &[Arc<Feature>]);

    /// Evicted or cleared features to undraw.
    fn features_removed(&self, features: &[Arc<Feature>]);
}
