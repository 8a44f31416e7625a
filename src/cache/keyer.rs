//! Viewport discretization: maps a continuous (extent, zoom) pair onto a
//! discrete cache key, and classifies viewports for cache invalidation.
//!
//! Two viewports that quantize to the same key are treated as already served
//! by the cache, even if their true extents differ slightly. Bounded
//! imprecision is accepted in exchange for cache hits under pan jitter.

use crate::cache::feature::Extent;
use crate::config::KeyerConfig;

/// Opaque cache-key value derived from a quantized viewport.
pub type CacheKey = String;

/// The viewport discretization policy.
pub struct ViewportKeyer {
    config: KeyerConfig,
}

impl ViewportKeyer {
    pub fn new(config: KeyerConfig) -> Self {
        Self { config }
    }

    /// Derive the cache key for a viewport.
    ///
    /// Each extent coordinate is quantized to `coordinate_precision` decimal
    /// places as a scaled integer (float formatting can render equal values
    /// differently), zoom is rounded to the nearest whole level, and the five
    /// values are concatenated.
    pub fn key_for(&self, extent: &Extent, zoom: f64) -> CacheKey {
        let factor = 10f64.powi(self.config.coordinate_precision);
        let q = |v: f64| (v * factor).round() as i64;
        format!(
            "{}:{}:{}:{}@{}",
            q(extent.min_x),
            q(extent.min_y),
            q(extent.max_x),
            q(extent.max_y),
            zoom.round() as i32
        )
    }

    /// Whether a viewport spans (nearly) the whole world.
    ///
    /// At world scale a single viewport can cross the antimeridian and
    /// produce extent values that defeat simple quantization, so such views
    /// are treated as always-reload: the caller clears its key set instead
    /// of trusting a key.
    pub fn is_world_wide(&self, extent: &Extent, zoom: f64) -> bool {
        extent.width() > self.config.world_lon_span_deg
            || extent.height() > self.config.world_lat_span_deg
            || zoom <= self.config.low_zoom_threshold
    }

    /// Whether a zoom change is large enough that cached keys are stale.
    ///
    /// Three whole levels (the default) is already a ~8x change in feature
    /// density; the cache has no per-key expiry, so the caller clears it
    /// wholesale.
    pub fn zoom_jump_exceeds(&self, previous_zoom: f64, new_zoom: f64) -> bool {
        (new_zoom - previous_zoom).abs() >= self.config.zoom_jump_threshold
    }
}
