//! The working set: the bounded collection of currently rendered features.
//!
//! Keyed by content hash, so membership checks and dedup are O(1). Eviction
//! is oldest-first by insertion timestamp. A single merge may legally push
//! the size above the cap; the cap is enforced as a follow-up step after
//! every merge, never as an insertion precondition.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::feature::{Feature, WorkingSetEntry};

/// The bounded collection of rendered features.
#[derive(Debug, Default)]
pub struct WorkingSet {
    entries: HashMap<String, WorkingSetEntry>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a feature with this content hash is already present.
    pub fn contains_hash(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    /// Number of features currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert every feature whose hash is not already present, stamping it
    /// with `now`. Returns the subset actually added, for renderer
    /// notification and count updates.
    pub fn add_all(&mut self, features: Vec<Feature>, now: Instant) -> Vec<Arc<Feature>> {
        let mut added = Vec::new();
        for feature in features {
            if self.entries.contains_key(&feature.content_hash) {
                continue;
            }
            let feature = Arc::new(feature);
            self.entries.insert(
                feature.content_hash.clone(),
                WorkingSetEntry {
                    feature: feature.clone(),
                    inserted_at: now,
                },
            );
            added.push(feature);
        }
        added
    }

    /// Remove a single feature by hash. Replacing a feature is
    /// remove-then-add; entries are never mutated in place.
    pub fn remove(&mut self, hash: &str) -> Option<Arc<Feature>> {
        self.entries.remove(hash).map(|entry| entry.feature)
    }

    /// Evict down to `max_entities` if the cap is exceeded.
    ///
    /// Removes the excess entries with the smallest `inserted_at`, ties
    /// broken by hash order so the outcome is deterministic. Returns the
    /// removed features for renderer notification.
    pub fn enforce_cap(&mut self, max_entities: usize) -> Vec<Arc<Feature>> {
        if self.entries.len() <= max_entities {
            return Vec::new();
        }
        let excess = self.entries.len() - max_entities;

        let victims: Vec<String> = {
            let mut order: Vec<(Instant, &str)> = self
                .entries
                .iter()
                .map(|(hash, entry)| (entry.inserted_at, hash.as_str()))
                .collect();
            order.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
            order
                .into_iter()
                .take(excess)
                .map(|(_, hash)| hash.to_string())
                .collect()
        };

        victims
            .iter()
            .filter_map(|hash| self.remove(hash))
            .collect()
    }

    /// Empty the set, returning everything that was held.
    ///
    /// Used on manual reset only; ordinary cache invalidation clears the
    /// loaded-key set, and previously drawn features remain until naturally
    /// evicted or replaced.
    pub fn clear_all(&mut self) -> Vec<Arc<Feature>> {
        self.entries
            .drain()
            .map(|(_, entry)| entry.feature)
            .collect()
    }

    /// Iterate over all entries (insertion order not guaranteed).
    pub fn iter(&self) -> impl Iterator<Item = &WorkingSetEntry> {
        self.entries.values()
    }
}
