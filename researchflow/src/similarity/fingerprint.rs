//! Hash-based text fingerprints.

use crate::errors::{ResearchflowError, Result};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Default fingerprint length.
pub const DEFAULT_DIMENSION: usize = 256;

const TOKEN_PATTERN: &str = r"[\p{L}\p{N}]+";
const UNIGRAM_WEIGHT: f64 = 1.0;
const BIGRAM_WEIGHT: f64 = 0.75;
const TRIGRAM_WEIGHT: f64 = 0.5;

/// A fixed-length, L2-normalized text vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    values: Vec<f64>,
}

impl Fingerprint {
    /// Wraps raw values without normalizing them.
    #[must_use]
    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Returns the vector.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Returns the vector length.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity with another fingerprint.
    #[must_use]
    pub fn similarity(&self, other: &Self) -> f64 {
        cosine_similarity(&self.values, &other.values)
    }
}

/// Cosine similarity clamped to [-1, 1]; 0 when either vector has no magnitude.
///
/// Vectors of different length are compared over their common prefix.
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b).sqrt()).clamp(-1.0, 1.0)
}

/// Builds fingerprints from word unigrams, word bigrams and character trigrams.
///
/// Each feature is hashed with SHA-256 into a signed bucket of the output
/// vector, so identical text always yields an identical vector and texts
/// sharing many features land close together.
#[derive(Debug, Clone)]
pub struct FingerprintGenerator {
    dimension: usize,
    tokens: Regex,
}

impl FingerprintGenerator {
    /// Creates a generator producing vectors of `dimension` values.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(ResearchflowError::validation("fingerprint dimension must be at least 1"));
        }
        let tokens = Regex::new(TOKEN_PATTERN).map_err(|e| ResearchflowError::Config(e.to_string()))?;
        Ok(Self { dimension, tokens })
    }

    /// Returns the output dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Lower-cases and trims `text`.
    #[must_use]
    pub fn normalize(text: &str) -> String {
        text.trim().to_lowercase()
    }

    /// Computes the fingerprint of `text`.
    #[must_use]
    pub fn generate(&self, text: &str) -> Fingerprint {
        let normalized = Self::normalize(text);
        let tokens: Vec<&str> = self.tokens.find_iter(&normalized).map(|m| m.as_str()).collect();
        let mut values = vec![0.0; self.dimension];

        if tokens.is_empty() {
            self.add_feature(&mut values, "s", &normalized, UNIGRAM_WEIGHT);
        } else {
            for token in &tokens {
                self.add_feature(&mut values, "w", token, UNIGRAM_WEIGHT);
            }
            for pair in tokens.windows(2) {
                self.add_feature(&mut values, "b", &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
            }
            let chars: Vec<char> = tokens.join(" ").chars().collect();
            for trigram in chars.windows(3) {
                let trigram: String = trigram.iter().collect();
                self.add_feature(&mut values, "c", &trigram, TRIGRAM_WEIGHT);
            }
        }

        let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in &mut values {
                *value /= norm;
            }
        }
        Fingerprint { values }
    }

    fn add_feature(&self, values: &mut [f64], namespace: &str, feature: &str, weight: f64) {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update([0_u8]);
        hasher.update(feature.as_bytes());
        let digest = hasher.finalize();

        let mut index_bytes = [0_u8; 8];
        index_bytes.copy_from_slice(&digest[..8]);
        let bucket = u64::from_le_bytes(index_bytes) % self.dimension as u64;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };

        #[allow(clippy::cast_possible_truncation)]
        let bucket = bucket as usize;
        values[bucket] += sign * weight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> FingerprintGenerator {
        FingerprintGenerator::new(DEFAULT_DIMENSION).unwrap()
    }

    #[test]
    fn test_identical_text_identical_vector() {
        let g = generator();
        let a = g.generate("Adaptive caching for edge inference");
        let b = g.generate("  ADAPTIVE caching for edge inference ");

        assert_eq!(a, b);
        assert_eq!(a.dimension(), DEFAULT_DIMENSION);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_vectors_are_unit_length() {
        let fp = generator().generate("sparse attention kernels");
        let norm: f64 = fp.as_slice().iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_similar_text_scores_higher_than_unrelated() {
        let g = generator();
        let base = g.generate("federated learning for medical imaging with differential privacy");
        let close = g.generate("federated learning for medical imaging under differential privacy");
        let far = g.generate("quantum error correction in superconducting qubits");

        assert!(base.similarity(&close) > base.similarity(&far));
        assert!(base.similarity(&close) > 0.6);
    }

    #[test]
    fn test_punctuation_only_text_falls_back_to_whole_string() {
        let g = generator();
        let a = g.generate("!!!");

        assert_eq!(a.as_slice().iter().filter(|v| **v != 0.0).count(), 1);
        assert!(a.similarity(&g.generate("!!!")) > 0.999);
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f64::EPSILON);
        assert!(cosine_similarity(&[], &[]).abs() < f64::EPSILON);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]) + 1.0).abs() < 1e-12);
        assert!((cosine_similarity(&[3.0, 4.0], &[3.0, 4.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(FingerprintGenerator::new(0).is_err());
    }
}
