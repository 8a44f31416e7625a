//! The data-source contract: bounding-box queries for geographic features.
//!
//! The HTTP (or other) transport behind this trait is the host application's
//! concern; the engine only sees queries, responses, and errors.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::feature::{RawFeature, Viewport};

/// Parameters of one bounding-box query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBoxQuery {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,

    /// Whole zoom level; sources commonly thin features by zoom.
    pub zoom: i32,
}

impl BoundingBoxQuery {
    /// Build the query for a viewport.
    pub fn from_viewport(viewport: &Viewport) -> Self {
        Self {
            min_lon: viewport.extent.min_x,
            min_lat: viewport.extent.min_y,
            max_lon: viewport.extent.max_x,
            max_lat: viewport.extent.max_y,
            zoom: viewport.zoom.round() as i32,
        }
    }
}

/// A successful bounding-box response.
///
/// `warning` (e.g. "result truncated by server-side limit") is surfaced to
/// the UI but does not change engine behavior. A failed query is an `Err`
/// from [`FeatureSource::query_bbox`], not a response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundingBoxResponse {
    pub features: Vec<RawFeature>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Why a fetch did not produce features.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("bounding-box request timed out after {0:?}")]
    Timeout(Duration),

    #[error("data source error: {0}")]
    Source(#[source] anyhow::Error),
}

/// Answers bounding-box queries.
///
/// Implementations are free to retry or batch internally; the engine issues
/// at most one query at a time and cancels superseded ones.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    async fn query_bbox(&self, query: &BoundingBoxQuery) -> anyhow::Result<BoundingBoxResponse>;
}
