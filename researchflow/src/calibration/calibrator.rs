//! Bucketed confidence calibration.

use crate::errors::{ResearchflowError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Number of equal-width confidence buckets over [0, 1].
pub const BUCKET_COUNT: usize = 5;

/// Observed or predicted result of a research item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Item held up.
    Pass,
    /// Item was partly right.
    Borderline,
    /// Item did not hold up.
    Fail,
}

impl Outcome {
    /// Maps a confidence to the outcome it predicts.
    #[must_use]
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.7 {
            Self::Pass
        } else if confidence >= 0.4 {
            Self::Borderline
        } else {
            Self::Fail
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Borderline => write!(f, "borderline"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

/// One prediction paired with what actually happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Item the prediction was about.
    pub item_id: String,
    /// Confidence in [0, 1].
    pub predicted_confidence: f64,
    /// Outcome that was predicted.
    pub predicted_outcome: Outcome,
    /// Outcome that was observed.
    pub actual_outcome: Outcome,
    /// When the outcome was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Evidence thresholds and adjustment strength.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Records required before any adjustment.
    #[serde(default = "default_min_samples")]
    pub min_total_samples: usize,
    /// Records required in the raw value's bucket before adjusting it.
    #[serde(default = "default_min_samples")]
    pub min_bucket_samples: usize,
    /// Fraction of the gap to the bucket pass rate that is closed.
    #[serde(default = "default_adjustment_weight")]
    pub adjustment_weight: f64,
}

fn default_min_samples() -> usize {
    10
}

fn default_adjustment_weight() -> f64 {
    0.5
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_total_samples: default_min_samples(),
            min_bucket_samples: default_min_samples(),
            adjustment_weight: default_adjustment_weight(),
        }
    }
}

impl CalibrationConfig {
    /// Checks the adjustment weight is in [0, 1].
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.adjustment_weight) {
            return Err(ResearchflowError::Config(format!(
                "calibration adjustment_weight must be in [0, 1], got {}",
                self.adjustment_weight
            )));
        }
        Ok(())
    }
}

/// Statistics of one confidence bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    /// Inclusive lower bound.
    pub lower: f64,
    /// Upper bound; exclusive except for the last bucket.
    pub upper: f64,
    /// Records in the bucket.
    pub count: usize,
    /// Records whose actual outcome was pass.
    pub passes: usize,
    /// Records whose actual outcome was borderline.
    pub borderline: usize,
    /// Records whose actual outcome was fail.
    pub failures: usize,
    /// Mean predicted confidence, 0 when empty.
    pub mean_confidence: f64,
    /// `passes / count`, 0 when empty.
    pub pass_rate: f64,
    /// `|pass_rate - midpoint|`, 0 when empty.
    pub calibration_error: f64,
}

impl BucketStats {
    /// Returns the bucket midpoint.
    #[must_use]
    pub fn midpoint(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }
}

/// Snapshot of calibration quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStats {
    /// Per-bucket statistics, lowest bucket first.
    pub buckets: Vec<BucketStats>,
    /// Total records.
    pub total_samples: usize,
    /// Count-weighted mean of bucket errors, in [0, 1].
    pub overall_error: f64,
    /// Share of records whose predicted outcome matched the actual one.
    pub prediction_accuracy: f64,
}

/// Learns from predicted-vs-observed outcomes and nudges new confidences.
#[derive(Debug, Default)]
pub struct OutcomeCalibrator {
    config: CalibrationConfig,
    records: RwLock<Vec<CalibrationRecord>>,
}

/// Returns the bucket index of a confidence in [0, 1].
#[must_use]
pub fn bucket_index(confidence: f64) -> usize {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let index = (confidence.clamp(0.0, 1.0) * BUCKET_COUNT as f64).floor() as usize;
    index.min(BUCKET_COUNT - 1)
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl OutcomeCalibrator {
    /// Creates a calibrator with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a calibrator with `config`.
    #[must_use]
    pub fn with_config(config: CalibrationConfig) -> Self {
        Self {
            config,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Appends an outcome. The confidence is clamped to [0, 1]; NaN is rejected.
    pub fn record_outcome(
        &self,
        item_id: impl Into<String>,
        predicted_confidence: f64,
        predicted_outcome: Outcome,
        actual_outcome: Outcome,
    ) -> Result<CalibrationRecord> {
        if predicted_confidence.is_nan() {
            return Err(ResearchflowError::validation("predicted confidence must be a number"));
        }
        let record = CalibrationRecord {
            item_id: item_id.into(),
            predicted_confidence: predicted_confidence.clamp(0.0, 1.0),
            predicted_outcome,
            actual_outcome,
            timestamp: Utc::now(),
        };
        debug!(
            item_id = %record.item_id,
            confidence = record.predicted_confidence,
            predicted = %predicted_outcome,
            actual = %actual_outcome,
            "Recorded calibration outcome"
        );
        self.records.write().push(record.clone());
        Ok(record)
    }

    /// Appends an outcome for an anonymous item, deriving the prediction
    /// from the confidence.
    pub fn record_observation(&self, confidence: f64, actual_outcome: Outcome) -> Result<CalibrationRecord> {
        self.record_outcome(
            Uuid::new_v4().to_string(),
            confidence,
            Outcome::from_confidence(confidence),
            actual_outcome,
        )
    }

    /// Returns a copy of the log.
    #[must_use]
    pub fn records(&self) -> Vec<CalibrationRecord> {
        self.records.read().clone()
    }

    /// Returns the number of recorded outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Computes per-bucket and overall statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CalibrationStats {
        let records = self.records.read();
        let width = 1.0 / BUCKET_COUNT as f64;

        let mut counts = [[0_usize; 3]; BUCKET_COUNT];
        let mut confidence_sums = [0.0_f64; BUCKET_COUNT];
        let mut correct = 0_usize;
        for record in records.iter() {
            let index = bucket_index(record.predicted_confidence);
            let slot = match record.actual_outcome {
                Outcome::Pass => 0,
                Outcome::Borderline => 1,
                Outcome::Fail => 2,
            };
            counts[index][slot] += 1;
            confidence_sums[index] += record.predicted_confidence;
            if record.predicted_outcome == record.actual_outcome {
                correct += 1;
            }
        }

        let buckets: Vec<BucketStats> = (0..BUCKET_COUNT)
            .map(|index| {
                let [passes, borderline, failures] = counts[index];
                let count = passes + borderline + failures;
                let lower = index as f64 * width;
                let upper = (index + 1) as f64 * width;
                let pass_rate = ratio(passes, count);
                let calibration_error = if count == 0 {
                    0.0
                } else {
                    (pass_rate - (lower + upper) / 2.0).abs()
                };
                BucketStats {
                    lower,
                    upper,
                    count,
                    passes,
                    borderline,
                    failures,
                    mean_confidence: if count == 0 { 0.0 } else { confidence_sums[index] / count as f64 },
                    pass_rate,
                    calibration_error,
                }
            })
            .collect();

        let total_samples = records.len();
        let weighted_error: f64 = buckets
            .iter()
            .map(|bucket| bucket.calibration_error * bucket.count as f64)
            .sum();
        let overall_error = if total_samples == 0 {
            0.0
        } else {
            (weighted_error / total_samples as f64).clamp(0.0, 1.0)
        };

        CalibrationStats {
            buckets,
            total_samples,
            overall_error,
            prediction_accuracy: ratio(correct, total_samples),
        }
    }

    /// Moves `raw` toward its bucket's observed pass rate once there is
    /// enough evidence; otherwise returns it (clamped) unchanged.
    #[must_use]
    pub fn adjust_confidence(&self, raw: f64) -> f64 {
        if raw.is_nan() {
            return raw;
        }
        let raw = raw.clamp(0.0, 1.0);
        let stats = self.stats();
        if stats.total_samples < self.config.min_total_samples {
            return raw;
        }

        let bucket = &stats.buckets[bucket_index(raw)];
        if bucket.count < self.config.min_bucket_samples {
            return raw;
        }

        let adjusted = (raw + (bucket.pass_rate - raw) * self.config.adjustment_weight).clamp(0.0, 1.0);
        debug!(raw, adjusted, pass_rate = bucket.pass_rate, "Adjusted confidence");
        adjusted
    }
}
