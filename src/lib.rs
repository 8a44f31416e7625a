//! viewport-cache: incremental feature loading for interactive map views.
//!
//! Given a moving/zooming viewport, the engine fetches only the geographic
//! data not already held, merges new features into a bounded working set
//! without duplicating already-rendered entities, and evicts the
//! oldest-inserted features once a size cap is exceeded:
//!   view change → debounce → cache-key check → fetch → dedup → merge → evict
//!
//! Embeds into a host map application via three seams: a [`fetch::source::FeatureSource`]
//! answering bounding-box queries, a [`render::FeatureRenderer`] receiving
//! add/remove notifications, and an [`cache::engine::EngineHandle`] fed with
//! viewport-change events.

pub mod cache;
pub mod config;
pub mod fetch;
pub mod render;

pub use cache::engine::{spawn_engine, EngineHandle, EngineStats, ViewportCacheEngine};
pub use cache::feature::{Extent, Feature, Geometry, Properties, PropertyValue, RawFeature, Viewport};
pub use config::Config;
pub use fetch::source::{BoundingBoxQuery, BoundingBoxResponse, FeatureSource};
pub use render::FeatureRenderer;
