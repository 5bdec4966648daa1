//! In-memory similarity index over known files.

use std::cmp::Ordering;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rayon::prelude::*;

use crate::error::Result;
use crate::types::{FileKey, KnownFile, RankedMatch};

/// Path-keyed index of known files with brute-force ranked lookup.
///
/// Entries are kept in insertion order so ranking is deterministic across
/// runs; the path map gives O(1) membership checks for static GETs. Reads
/// take a shared snapshot, and same-path inserts are serialized by the
/// dashmap shard entry, so a vector is never computed twice for one path.
///
/// Ranking is a linear O(N·D) scan. That is deliberate: the service
/// targets curated corpora of at most a few thousand images, not
/// web-scale search.
pub struct SimilarityIndex {
    entries: RwLock<Vec<Arc<KnownFile>>>,
    by_path: DashMap<FileKey, usize>,
}

impl SimilarityIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            by_path: DashMap::new(),
        }
    }

    /// Number of indexed files.
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `path` has been registered.
    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    /// Looks up a known file by path.
    pub fn get(&self, path: &str) -> Option<Arc<KnownFile>> {
        let slot = *self.by_path.get(path)?;
        self.read_entries().get(slot).cloned()
    }

    /// Inserts `file` unless its path is already indexed.
    ///
    /// Returns true when the file was newly added.
    pub fn insert(&self, file: KnownFile) -> bool {
        match self.by_path.entry(file.path.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let mut entries = self.write_entries();
                slot.insert(entries.len());
                entries.push(Arc::new(file));
                true
            }
        }
    }

    /// Inserts the result of `build` under `path` unless already present.
    ///
    /// `build` runs while the vacant map entry is held, so two concurrent
    /// registrations of the same path perform the computation exactly
    /// once; the loser observes the occupied entry and returns `Ok(false)`
    /// without building anything. Errors from `build` leave the index
    /// unchanged.
    pub fn insert_with<F>(&self, path: &str, build: F) -> Result<bool>
    where
        F: FnOnce() -> Result<KnownFile>,
    {
        match self.by_path.entry(path.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                let file = build()?;
                let mut entries = self.write_entries();
                slot.insert(entries.len());
                entries.push(Arc::new(file));
                Ok(true)
            }
        }
    }

    /// Ranks every known file against `query` by cosine similarity.
    ///
    /// Entries scoring at or below `cutoff` are dropped; the survivors come
    /// back in strictly descending score order, with ties keeping insertion
    /// order.
    pub fn rank(&self, query: &[f32], cutoff: f32) -> Vec<RankedMatch> {
        let snapshot: Vec<Arc<KnownFile>> = self.read_entries().clone();

        // Brute-force scan; rayon keeps the snapshot order in the collect.
        let mut matches: Vec<RankedMatch> = snapshot
            .par_iter()
            .filter_map(|file| {
                let score = cosine_similarity(query, &file.features);
                (score > cutoff).then(|| RankedMatch::new(file.path.clone(), score))
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        matches
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Vec<Arc<KnownFile>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Vec<Arc<KnownFile>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimilarityIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero-norm inputs rather than
/// propagating a NaN into the ranking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
