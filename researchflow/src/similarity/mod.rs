//! Cross-run near-duplicate detection.
//!
//! Fingerprints are feature-hashed text vectors, not learned embeddings;
//! they catch rephrasings that share most words and little else.

mod dedup;
mod fingerprint;

pub use dedup::{
    DedupConfig, DedupDecision, DedupOutcome, DuplicateMatch, Fingerprintable, SimilarityDeduplicator,
};
pub use fingerprint::{cosine_similarity, Fingerprint, FingerprintGenerator, DEFAULT_DIMENSION};
