//! Near-duplicate detection against a bounded FIFO store of fingerprints.

use super::fingerprint::{Fingerprint, FingerprintGenerator, DEFAULT_DIMENSION};
use crate::errors::{ResearchflowError, Result};
use crate::stages::ResearchItem;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Deduplicator settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Fingerprint length.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Similarity at or above which an item is a duplicate.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Maximum number of retained fingerprints.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

fn default_threshold() -> f64 {
    0.92
}

fn default_capacity() -> usize {
    2_000
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            threshold: default_threshold(),
            capacity: default_capacity(),
        }
    }
}

impl DedupConfig {
    /// Sets the duplicate threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the store capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the fingerprint length.
    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Checks threshold in (0, 1], capacity ≥ 1 and dimension ≥ 1.
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ResearchflowError::Config(format!(
                "dedup threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if self.capacity == 0 {
            return Err(ResearchflowError::Config("dedup capacity must be at least 1".to_string()));
        }
        if self.dimension == 0 {
            return Err(ResearchflowError::Config("dedup dimension must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Classification of one checked item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DedupDecision {
    /// No retained fingerprint is similar enough; the item was stored.
    Unique,
    /// The item matched a retained fingerprint and was not stored.
    Duplicate {
        /// Id of the retained item it matched.
        matched_id: String,
        /// Similarity with that item.
        similarity: f64,
    },
}

impl DedupDecision {
    /// Returns true for [`DedupDecision::Duplicate`].
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Something that can be fingerprinted under a stable id.
pub trait Fingerprintable {
    /// Id under which the fingerprint is stored.
    fn fingerprint_id(&self) -> &str;

    /// Text the fingerprint is computed from.
    fn fingerprint_text(&self) -> &str;
}

impl Fingerprintable for ResearchItem {
    fn fingerprint_id(&self) -> &str {
        &self.id
    }

    fn fingerprint_text(&self) -> &str {
        &self.content
    }
}

/// An item rejected as a near-duplicate.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch<T> {
    /// The rejected item.
    pub item: T,
    /// Id of the retained item it matched.
    pub matched_id: String,
    /// Similarity with that item.
    pub similarity: f64,
}

/// Result of deduplicating a batch, both lists in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupOutcome<T> {
    /// Items that were stored.
    pub unique: Vec<T>,
    /// Items that matched a retained fingerprint.
    pub duplicates: Vec<DuplicateMatch<T>>,
}

/// Flags near-duplicates against a sliding window of fingerprints.
///
/// The store lives as long as the deduplicator, so sharing one instance
/// across runs detects repeats between runs. Lookups are linear in the
/// number of retained fingerprints.
#[derive(Debug)]
pub struct SimilarityDeduplicator {
    generator: FingerprintGenerator,
    threshold: f64,
    capacity: usize,
    store: Mutex<VecDeque<(String, Fingerprint)>>,
}

impl SimilarityDeduplicator {
    /// Creates a deduplicator after validating `config`.
    pub fn new(config: DedupConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            generator: FingerprintGenerator::new(config.dimension)?,
            threshold: config.threshold,
            capacity: config.capacity,
            store: Mutex::new(VecDeque::new()),
        })
    }

    /// Returns the duplicate threshold.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns the store capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the fingerprint generator.
    #[must_use]
    pub fn generator(&self) -> &FingerprintGenerator {
        &self.generator
    }

    /// Classifies `text`, storing its fingerprint under `id` when unique.
    ///
    /// Storing an id that is already retained replaces the old entry and
    /// moves it to the back of the eviction queue.
    pub fn check(&self, id: &str, text: &str) -> DedupDecision {
        let fingerprint = self.generator.generate(text);

        let mut store = self.store.lock();
        let best = store
            .iter()
            .map(|(stored_id, stored)| (stored_id, fingerprint.similarity(stored)))
            .fold(None::<(&String, f64)>, |best, (stored_id, similarity)| match best {
                Some((_, top)) if top >= similarity => best,
                _ => Some((stored_id, similarity)),
            });

        if let Some((matched_id, similarity)) = best {
            if similarity >= self.threshold {
                let matched_id = matched_id.clone();
                debug!(id, matched_id = %matched_id, similarity, "Near-duplicate detected");
                return DedupDecision::Duplicate { matched_id, similarity };
            }
        }

        store.retain(|(stored_id, _)| stored_id != id);
        store.push_back((id.to_string(), fingerprint));
        while store.len() > self.capacity {
            if let Some((evicted, _)) = store.pop_front() {
                debug!(evicted = %evicted, "Evicted fingerprint");
            }
        }
        DedupDecision::Unique
    }

    /// Splits `items` into unique items and duplicates, preserving order.
    ///
    /// Later items of the batch are matched against earlier unique ones.
    pub fn deduplicate<T: Fingerprintable>(&self, items: Vec<T>) -> DedupOutcome<T> {
        let total = items.len();
        let mut outcome = DedupOutcome {
            unique: Vec::with_capacity(total),
            duplicates: Vec::new(),
        };

        for item in items {
            match self.check(item.fingerprint_id(), item.fingerprint_text()) {
                DedupDecision::Unique => outcome.unique.push(item),
                DedupDecision::Duplicate { matched_id, similarity } => outcome.duplicates.push(DuplicateMatch {
                    item,
                    matched_id,
                    similarity,
                }),
            }
        }

        info!(
            total,
            unique = outcome.unique.len(),
            duplicates = outcome.duplicates.len(),
            "Deduplicated batch"
        );
        outcome
    }

    /// Returns true if a fingerprint is retained under `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.store.lock().iter().any(|(stored_id, _)| stored_id == id)
    }

    /// Returns the number of retained fingerprints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    /// Returns true if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Drops every retained fingerprint.
    pub fn clear(&self) {
        self.store.lock().clear();
    }
}
