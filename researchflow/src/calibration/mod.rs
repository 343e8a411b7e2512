//! Confidence calibration from observed outcomes.

mod calibrator;

pub use calibrator::{
    bucket_index, BucketStats, CalibrationConfig, CalibrationRecord, CalibrationStats, Outcome,
    OutcomeCalibrator, BUCKET_COUNT,
};
