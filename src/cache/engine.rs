//! The viewport cache engine: orchestrates keying, fetching, dedup, and
//! eviction for a moving map viewport.
//!
//! State machine: Idle → Loading → (Merging) → Idle, with Loading
//! interruptible by a newer viewport at any time. All state lives on one
//! event-loop task; the only concurrency hazard is a stale network
//! completion, which is rejected by generation number.
//!
//! On a debounced viewport change the engine:
//! 1. Computes the cache key for the quantized viewport
//! 2. Clears the loaded-key set on world-wide views and zoom jumps
//! 3. Skips the fetch entirely when the key was already served
//! 4. Otherwise issues a bounding-box query, superseding any in-flight one
//! 5. On response: hashes, dedups, merges, enforces the cap, notifies the
//!    renderer, and marks the key loaded

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::feature::{Feature, RawFeature, Viewport};
use crate::cache::hasher;
use crate::cache::keyer::{CacheKey, ViewportKeyer};
use crate::cache::working_set::WorkingSet;
use crate::config::{Config, ConfigError};
use crate::fetch::coordinator::{
    FetchCompletion, FetchCompletions, FetchOutcome, RequestCoordinator,
};
use crate::fetch::source::{BoundingBoxQuery, FeatureSource};
use crate::render::FeatureRenderer;

/// Observable engine state for the host UI.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Whether a fetch is outstanding.
    pub is_loading: bool,

    /// Features currently in the working set.
    pub entity_count: usize,

    /// Cache keys marked as already served.
    pub loaded_key_count: usize,

    /// When the working set last changed from a successful fetch.
    pub last_update: Option<Instant>,

    /// Total bounding-box queries issued.
    pub fetches_issued: u64,

    /// Queries superseded by a newer viewport.
    pub fetches_superseded: u64,

    /// Queries that failed or timed out.
    pub fetches_failed: u64,

    /// Fetched features dropped as duplicates of rendered ones.
    pub duplicates_skipped: u64,

    /// Features evicted by the size cap.
    pub evicted_total: u64,

    /// Most recent data-source warning, if any.
    pub last_warning: Option<String>,
}

/// Commands accepted by the engine's event loop.
#[derive(Debug)]
pub enum EngineCommand {
    /// The map view moved or zoomed; restarts the debounce timer.
    ViewportChanged(Viewport),

    /// Manual reset: clear the working set and all cached keys.
    Reset,

    /// Tear down: cancel any in-flight request and stop the loop.
    Shutdown,
}

/// The orchestrator.
///
/// Owns the working set and loaded-key set exclusively; collaborators (data
/// source, renderer) are injected so the engine is constructible and
/// testable without a real map or network.
pub struct ViewportCacheEngine {
    config: Arc<Config>,
    keyer: ViewportKeyer,
    coordinator: RequestCoordinator,
    working_set: WorkingSet,
    loaded_keys: HashSet<CacheKey>,
    renderer: Arc<dyn FeatureRenderer>,
    last_zoom: Option<f64>,
    inflight_key: Option<(u64, CacheKey)>,
    stats: EngineStats,
    stats_tx: watch::Sender<EngineStats>,
}

impl ViewportCacheEngine {
    /// Create an engine and the channel its fetch completions arrive on.
    ///
    /// Fails on a configuration the engine cannot run with (e.g. a zero
    /// working-set cap).
    pub fn new(
        config: Config,
        source: Arc<dyn FeatureSource>,
        renderer: Arc<dyn FeatureRenderer>,
    ) -> Result<(Self, FetchCompletions), ConfigError> {
        config.validate()?;
        let config = Arc::new(config);

        let keyer = ViewportKeyer::new(config.keyer.clone());
        let (coordinator, completions) = RequestCoordinator::new(source, config.fetch.timeout());
        let (stats_tx, _) = watch::channel(EngineStats::default());

        Ok((
            Self {
                config,
                keyer,
                coordinator,
                working_set: WorkingSet::new(),
                loaded_keys: HashSet::new(),
                renderer,
                last_zoom: None,
                inflight_key: None,
                stats: EngineStats::default(),
                stats_tx,
            },
            completions,
        ))
    }

    /// Subscribe to stats snapshots, published after every state transition.
    pub fn subscribe_stats(&self) -> watch::Receiver<EngineStats> {
        self.stats_tx.subscribe()
    }

    /// Current stats snapshot.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Handle a debounced viewport change (state machine steps 2-4).
    pub fn handle_viewport(&mut self, viewport: Viewport) {
        let key = self.keyer.key_for(&viewport.extent, viewport.zoom);

        let world_wide = self.keyer.is_world_wide(&viewport.extent, viewport.zoom);
        let zoom_jumped = self
            .last_zoom
            .is_some_and(|last| self.keyer.zoom_jump_exceeds(last, viewport.zoom));
        self.last_zoom = Some(viewport.zoom);

        if world_wide || zoom_jumped {
            // Correctness at scale transitions beats cache-hit rate: drop
            // every cached key, but leave drawn features in place.
            if !self.loaded_keys.is_empty() {
                info!(
                    cleared = self.loaded_keys.len(),
                    world_wide, zoom_jumped, "Invalidating loaded-key cache"
                );
                self.loaded_keys.clear();
            }
        } else if self.loaded_keys.contains(&key) {
            debug!(%key, "Viewport already served; skipping fetch");
            self.publish_stats();
            return;
        }

        let generation = self
            .coordinator
            .begin(BoundingBoxQuery::from_viewport(&viewport));
        self.inflight_key = Some((generation, key));
        self.stats.is_loading = true;
        self.publish_stats();
    }

    /// Handle a fetch completion (state machine steps 5-7).
    pub fn handle_completion(&mut self, completion: FetchCompletion) {
        if !self.coordinator.is_current(completion.generation) {
            // A newer viewport superseded this request; its results must
            // never be applied.
            debug!(
                generation = completion.generation,
                request_id = %completion.request_id,
                "Discarding stale completion"
            );
            self.publish_stats();
            return;
        }
        self.coordinator.finish(completion.generation);

        let key = match self.inflight_key.take() {
            Some((generation, key)) if generation == completion.generation => Some(key),
            other => {
                self.inflight_key = other;
                None
            }
        };

        self.stats.is_loading = false;

        match completion.outcome {
            FetchOutcome::Fetched(response) => {
                if let Some(warning) = response.warning {
                    warn!(%warning, "Data source warning");
                    self.stats.last_warning = Some(warning);
                }
                self.merge(response.features);
                if let Some(key) = key {
                    self.loaded_keys.insert(key);
                }
                self.stats.last_update = Some(Instant::now());
            }
            FetchOutcome::Failed(err) => {
                // The key was never marked loaded, so the same viewport is
                // retried on the next qualifying view-change event.
                warn!(error = %err, "Bounding-box fetch failed");
                self.stats.fetches_failed += 1;
            }
        }
        self.publish_stats();
    }

    /// Hash, dedup, merge, and enforce the cap for one batch of features.
    fn merge(&mut self, raw: Vec<RawFeature>) {
        let features = self.ingest(raw);
        let total = features.len();

        let added = self.working_set.add_all(features, Instant::now());
        self.stats.duplicates_skipped += (total - added.len()) as u64;
        if !added.is_empty() {
            self.renderer.features_added(&added);
        }

        let removed = self.working_set.enforce_cap(self.config.cache.max_entities);
        if !removed.is_empty() {
            debug!(evicted = removed.len(), "Working set cap enforced");
            self.stats.evicted_total += removed.len() as u64;
            self.renderer.features_removed(&removed);
        }

        debug!(
            fetched = total,
            added = added.len(),
            working_set = self.working_set.len(),
            "Merge complete"
        );
    }

    /// Compute content hashes for a fetched batch.
    ///
    /// A feature that cannot be hashed is kept under a synthetic identity
    /// (treated as never a duplicate) rather than dropped.
    fn ingest(&self, raw: Vec<RawFeature>) -> Vec<Feature> {
        raw.into_iter()
            .map(
                |feature| match hasher::content_hash(&feature.geometry, &feature.properties) {
                    Ok(hash) => Feature::new(feature, hash),
                    Err(err) => {
                        warn!(error = %err, "Feature could not be hashed; keeping without dedup");
                        Feature::new(feature, format!("unhashed-{}", Uuid::new_v4()))
                    }
                },
            )
            .collect()
    }

    /// Manual reset: cancel any in-flight request and empty all state.
    ///
    /// Unlike cache invalidation, this also clears the working set and tells
    /// the renderer to undraw everything.
    pub fn reset(&mut self) {
        self.coordinator.cancel_all();
        self.inflight_key = None;
        self.loaded_keys.clear();

        let removed = self.working_set.clear_all();
        info!(removed = removed.len(), "Engine reset");
        if !removed.is_empty() {
            self.renderer.features_removed(&removed);
        }

        self.stats.is_loading = false;
        self.publish_stats();
    }

    /// Teardown: cancel any in-flight request. Remaining state is released
    /// when the engine is dropped.
    pub fn shutdown(&mut self) {
        self.coordinator.cancel_all();
        self.inflight_key = None;
        self.stats.is_loading = false;
        self.publish_stats();
    }

    fn publish_stats(&mut self) {
        self.stats.entity_count = self.working_set.len();
        self.stats.loaded_key_count = self.loaded_keys.len();
        self.stats.fetches_issued = self.coordinator.stats().issued;
        self.stats.fetches_superseded = self.coordinator.stats().superseded;
        self.stats_tx.send_replace(self.stats.clone());
    }
}

/// Handle for driving a spawned engine.
///
/// The host wires its map widget's view-change events to
/// [`EngineHandle::viewport_changed`]; the engine debounces bursts into a
/// single fetch.
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    stats: watch::Receiver<EngineStats>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// The viewport moved or zoomed.
    pub fn viewport_changed(&self, viewport: Viewport) {
        let _ = self.commands.send(EngineCommand::ViewportChanged(viewport));
    }

    /// Clear the working set and all cached keys.
    pub fn reset(&self) {
        let _ = self.commands.send(EngineCommand::Reset);
    }

    /// Cancel any in-flight request and stop the engine task.
    pub fn shutdown(&self) {
        let _ = self.commands.send(EngineCommand::Shutdown);
    }

    /// Latest stats snapshot.
    pub fn stats(&self) -> EngineStats {
        self.stats.borrow().clone()
    }

    /// Subscribe to stats updates.
    pub fn stats_receiver(&self) -> watch::Receiver<EngineStats> {
        self.stats.clone()
    }

    /// Wait for the engine task to finish after [`EngineHandle::shutdown`].
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Spawn the engine's event loop and return a handle to it.
pub fn spawn_engine(engine: ViewportCacheEngine, completions: FetchCompletions) -> EngineHandle {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let stats = engine.subscribe_stats();
    let task = tokio::spawn(run_loop(engine, commands_rx, completions));
    EngineHandle {
        commands: commands_tx,
        stats,
        task,
    }
}

/// The event loop: a single task owns all engine state, so completions and
/// view-change events only ever interleave, never race.
async fn run_loop(
    mut engine: ViewportCacheEngine,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
    mut completions: FetchCompletions,
) {
    let debounce = engine.config.fetch.debounce();
    let mut pending: Option<Viewport> = None;
    let mut deadline: Option<tokio::time::Instant> = None;

    loop {
        // When no debounce is pending the timer branch is disabled and the
        // placeholder deadline is never polled.
        let sleep_target =
            deadline.unwrap_or_else(|| tokio::time::Instant::now() + std::time::Duration::from_secs(3600));

        tokio::select! {
            command = commands.recv() => match command {
                Some(EngineCommand::ViewportChanged(viewport)) => {
                    // Each event restarts the timer, coalescing pan/zoom
                    // bursts into a single fetch.
                    pending = Some(viewport);
                    deadline = Some(tokio::time::Instant::now() + debounce);
                }
                Some(EngineCommand::Reset) => {
                    pending = None;
                    deadline = None;
                    engine.reset();
                }
                Some(EngineCommand::Shutdown) | None => {
                    engine.shutdown();
                    break;
                }
            },
            _ = tokio::time::sleep_until(sleep_target), if deadline.is_some() => {
                deadline = None;
                if let Some(viewport) = pending.take() {
                    engine.handle_viewport(viewport);
                }
            }
            Some(completion) = completions.recv() => {
                engine.handle_completion(completion);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::feature::Extent;
    use crate::fetch::source::BoundingBoxResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EmptySource;

    #[async_trait]
    impl crate::fetch::source::FeatureSource for EmptySource {
        async fn query_bbox(
            &self,
            _query: &BoundingBoxQuery,
        ) -> anyhow::Result<BoundingBoxResponse> {
            Ok(BoundingBoxResponse::default())
        }
    }

    #[derive(Default)]
    struct RecordingRenderer {
        added: Mutex<usize>,
        removed: Mutex<usize>,
    }

    impl FeatureRenderer for RecordingRenderer {
        fn features_added(&self, features: &[Arc<Feature>]) {
            *self.added.lock().unwrap() += features.len();
        }
        fn features_removed(&self, features: &[Arc<Feature>]) {
            *self.removed.lock().unwrap() += features.len();
        }
    }

    fn city_viewport() -> Viewport {
        Viewport::new(Extent::new(13.35, 52.48, 13.46, 52.55), 12.0)
    }

    #[test]
    fn test_zero_cap_is_fatal_at_construction() {
        let mut config = Config::default();
        config.cache.max_entities = 0;
        let result = ViewportCacheEngine::new(
            config,
            Arc::new(EmptySource),
            Arc::new(RecordingRenderer::default()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cached_key_skips_fetch() {
        let (mut engine, mut completions) = ViewportCacheEngine::new(
            Config::default(),
            Arc::new(EmptySource),
            Arc::new(RecordingRenderer::default()),
        )
        .unwrap();

        engine.handle_viewport(city_viewport());
        let completion = completions.recv().await.unwrap();
        engine.handle_completion(completion);
        assert_eq!(engine.stats().fetches_issued, 1);
        assert_eq!(engine.stats().loaded_key_count, 1);

        // Same quantized viewport again: no new fetch.
        engine.handle_viewport(city_viewport());
        assert_eq!(engine.stats().fetches_issued, 1);
        assert!(!engine.stats().is_loading);
    }

    #[tokio::test]
    async fn test_failed_fetch_does_not_mark_key_loaded() {
        struct FailingSource;

        #[async_trait]
        impl crate::fetch::source::FeatureSource for FailingSource {
            async fn query_bbox(
                &self,
                _query: &BoundingBoxQuery,
            ) -> anyhow::Result<BoundingBoxResponse> {
                anyhow::bail!("upstream down")
            }
        }

        let (mut engine, mut completions) = ViewportCacheEngine::new(
            Config::default(),
            Arc::new(FailingSource),
            Arc::new(RecordingRenderer::default()),
        )
        .unwrap();

        engine.handle_viewport(city_viewport());
        let completion = completions.recv().await.unwrap();
        engine.handle_completion(completion);

        assert_eq!(engine.stats().fetches_failed, 1);
        assert_eq!(engine.stats().loaded_key_count, 0);

        // The same viewport qualifies again and refetches.
        engine.handle_viewport(city_viewport());
        assert_eq!(engine.stats().fetches_issued, 2);
    }
}
