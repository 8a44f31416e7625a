//! Shared mocks and builders for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use viewport_cache::{
    BoundingBoxQuery, BoundingBoxResponse, Extent, Feature, FeatureRenderer, FeatureSource,
    Geometry, Properties, RawFeature, Viewport,
};

/// One scripted data-source reply.
pub enum Reply {
    Features(Vec<RawFeature>),
    Warning(Vec<RawFeature>, String),
    Failure(String),
    Hang,
}

/// Scripted in-process data source; replies are consumed in order, and an
/// exhausted script answers with an empty feature list.
pub struct MockSource {
    script: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<BoundingBoxQuery>>,
}

impl MockSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn enqueue(&self, reply: Reply) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<BoundingBoxQuery> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeatureSource for MockSource {
    async fn query_bbox(&self, query: &BoundingBoxQuery) -> anyhow::Result<BoundingBoxResponse> {
        self.calls.lock().unwrap().push(query.clone());
        let reply = self.script.lock().unwrap().pop_front();
        match reply {
            None => Ok(BoundingBoxResponse::default()),
            Some(Reply::Features(features)) => Ok(BoundingBoxResponse {
                features,
                warning: None,
            }),
            Some(Reply::Warning(features, warning)) => Ok(BoundingBoxResponse {
                features,
                warning: Some(warning),
            }),
            Some(Reply::Failure(message)) => anyhow::bail!("{message}"),
            Some(Reply::Hang) => std::future::pending().await,
        }
    }
}

/// Records every add/remove notification by content hash.
#[derive(Default)]
pub struct RecordingRenderer {
    added: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
}

impl RecordingRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn added_count(&self) -> usize {
        self.added.lock().unwrap().len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.lock().unwrap().len()
    }

    pub fn removed_hashes(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

impl FeatureRenderer for RecordingRenderer {
    fn features_added(&self, features: &[Arc<Feature>]) {
        self.added
            .lock()
            .unwrap()
            .extend(features.iter().map(|f| f.content_hash.clone()));
    }

    fn features_removed(&self, features: &[Arc<Feature>]) {
        self.removed
            .lock()
            .unwrap()
            .extend(features.iter().map(|f| f.content_hash.clone()));
    }
}

/// `count` point features with distinct coordinates (distinct hashes),
/// numbered from `start`. Overlapping ranges simulate overlapping queries.
pub fn point_features(start: u32, count: usize) -> Vec<RawFeature> {
    (start..start + count as u32)
        .map(|i| RawFeature {
            geometry: Geometry::Point([f64::from(i) * 0.001, 0.0]),
            properties: Properties::new(),
        })
        .collect()
}

/// A city-scale viewport, zoom 12.
pub fn city_viewport() -> Viewport {
    Viewport::new(Extent::new(13.35, 52.48, 13.46, 52.55), 12.0)
}

/// The city viewport panned east by `degrees`.
pub fn panned_viewport(degrees: f64) -> Viewport {
    Viewport::new(
        Extent::new(13.35 + degrees, 52.48, 13.46 + degrees, 52.55),
        12.0,
    )
}

/// A whole-world viewport at zoom 1.
pub fn world_viewport() -> Viewport {
    Viewport::new(Extent::new(-179.0, -85.0, 179.0, 85.0), 1.0)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "viewport_cache=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
