//! Request coordination: at most one bounding-box query in flight.
//!
//! A newer viewport supersedes an older request. Network-level abort is best
//! effort; the guarantee that a stale response is never applied comes from a
//! monotonically increasing generation number checked by the receiver before
//! results are used.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::fetch::source::{BoundingBoxQuery, BoundingBoxResponse, FeatureSource, FetchError};

/// Terminal state of one fetch.
///
/// Supersession is not an outcome: a superseded request's completion (if it
/// arrives at all) carries a stale generation and is discarded by the
/// receiver.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(BoundingBoxResponse),
    Failed(FetchError),
}

/// Completion of one fetch, tagged with the generation it was issued under.
#[derive(Debug)]
pub struct FetchCompletion {
    pub generation: u64,
    pub request_id: Uuid,
    pub outcome: FetchOutcome,
}

/// Receiving half of the completion channel.
pub type FetchCompletions = mpsc::UnboundedReceiver<FetchCompletion>;

/// Coordinator counters.
#[derive(Debug, Default, Clone)]
pub struct CoordinatorStats {
    pub issued: u64,
    pub superseded: u64,
}

struct InflightRequest {
    generation: u64,
    request_id: Uuid,
    task: JoinHandle<()>,
}

/// Issues bounding-box queries, owning at most one in-flight request.
pub struct RequestCoordinator {
    source: Arc<dyn FeatureSource>,
    timeout: Duration,
    completions: mpsc::UnboundedSender<FetchCompletion>,
    current_generation: u64,
    inflight: Option<InflightRequest>,
    stats: CoordinatorStats,
}

impl RequestCoordinator {
    /// Create a coordinator and the channel its completions arrive on.
    pub fn new(source: Arc<dyn FeatureSource>, timeout: Duration) -> (Self, FetchCompletions) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                source,
                timeout,
                completions: tx,
                current_generation: 0,
                inflight: None,
                stats: CoordinatorStats::default(),
            },
            rx,
        )
    }

    /// Issue a query, superseding any request still in flight.
    ///
    /// Returns the generation the new request was issued under; its
    /// completion carries the same number.
    pub fn begin(&mut self, query: BoundingBoxQuery) -> u64 {
        self.cancel_all();

        self.current_generation += 1;
        let generation = self.current_generation;
        let request_id = Uuid::new_v4();

        let source = self.source.clone();
        let completions = self.completions.clone();
        let timeout = self.timeout;

        let task = tokio::spawn(async move {
            debug!(%request_id, generation, ?query, "Issuing bounding-box query");

            let outcome = match tokio::time::timeout(timeout, source.query_bbox(&query)).await {
                Ok(Ok(response)) => FetchOutcome::Fetched(response),
                Ok(Err(err)) => FetchOutcome::Failed(FetchError::Source(err)),
                Err(_) => {
                    warn!(%request_id, generation, ?timeout, "Bounding-box query timed out");
                    FetchOutcome::Failed(FetchError::Timeout(timeout))
                }
            };

            // Receiver may be gone during teardown.
            let _ = completions.send(FetchCompletion {
                generation,
                request_id,
                outcome,
            });
        });

        self.inflight = Some(InflightRequest {
            generation,
            request_id,
            task,
        });
        self.stats.issued += 1;
        generation
    }

    /// Whether a completion's generation is still the current one. Stale
    /// completions must be discarded by the caller.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.current_generation
    }

    /// Mark the current request finished once its completion was applied.
    pub fn finish(&mut self, generation: u64) {
        if self
            .inflight
            .as_ref()
            .is_some_and(|request| request.generation == generation)
        {
            self.inflight = None;
        }
    }

    /// Abort any in-flight request. Used when superseding, on manual reset,
    /// and at teardown.
    ///
    /// Also advances the generation: the aborted task may already have
    /// queued its completion, and that completion must read as stale.
    pub fn cancel_all(&mut self) {
        if let Some(request) = self.inflight.take() {
            debug!(
                request_id = %request.request_id,
                generation = request.generation,
                "Superseding in-flight request"
            );
            request.task.abort();
            self.current_generation += 1;
            self.stats.superseded += 1;
        }
    }

    /// Whether a request is currently outstanding.
    pub fn has_inflight(&self) -> bool {
        self.inflight.is_some()
    }

    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }
}

impl Drop for RequestCoordinator {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
