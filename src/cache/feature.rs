//! Feature and viewport types.
//!
//! A feature is one geographic entity as delivered by the data source.
//! Features are the unit of dedup, rendering, and eviction.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// A rectangular map extent in geographic degrees (lon/lat).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Longitude span in degrees.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Latitude span in degrees.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// The currently visible map region.
///
/// Transient: recomputed on every map move/zoom event and passed to the
/// engine with the event, never stored across events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub extent: Extent,
    pub zoom: f64,
}

impl Viewport {
    pub fn new(extent: Extent, zoom: f64) -> Self {
        Self { extent, zoom }
    }
}

/// Feature geometry, GeoJSON-style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point([f64; 2]),
    LineString(Vec<[f64; 2]>),
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl Geometry {
    /// Stable type tag, fed into the content hash.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
        }
    }

    /// All coordinate pairs in definition order.
    pub fn coordinates(&self) -> Box<dyn Iterator<Item = &[f64; 2]> + '_> {
        match self {
            Geometry::Point(p) => Box::new(std::iter::once(p)),
            Geometry::LineString(line) => Box::new(line.iter()),
            Geometry::Polygon(rings) => Box::new(rings.iter().flatten()),
        }
    }

    /// Number of coordinate pairs.
    pub fn coordinate_count(&self) -> usize {
        match self {
            Geometry::Point(_) => 1,
            Geometry::LineString(line) => line.len(),
            Geometry::Polygon(rings) => rings.iter().map(Vec::len).sum(),
        }
    }
}

/// A scalar feature property.
///
/// Kept in a `BTreeMap` so iteration order (and therefore the content hash)
/// is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Property map shared by raw and ingested features.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A feature as delivered by the data source, before ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFeature {
    pub geometry: Geometry,

    #[serde(default)]
    pub properties: Properties,
}

/// An ingested feature.
///
/// `content_hash` is computed once at ingestion and is immutable thereafter;
/// it is the sole identity used for dedup. A server-assigned ID would not
/// work here: the same geometry recurs across overlapping bounding-box
/// queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: Properties,
    pub content_hash: String,
}

impl Feature {
    pub fn new(raw: RawFeature, content_hash: String) -> Self {
        Self {
            geometry: raw.geometry,
            properties: raw.properties,
            content_hash,
        }
    }
}

/// One slot in the working set.
///
/// Entries are never mutated in place; replacing a feature means
/// remove-then-add, which refreshes `inserted_at`.
#[derive(Debug, Clone)]
pub struct WorkingSetEntry {
    pub feature: Arc<Feature>,
    pub inserted_at: Instant,
}
