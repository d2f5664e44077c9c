//! Winning-curve calibration.
//!
//! - **model**: the training contract (`CalibrationTrainer`, `WinProbabilityModel`)
//! - **boosted**: gradient-boosted stumps on log-loss (default learner)
//! - **logistic**: L2-regularised logistic regression
//! - **recalibrator**: drains per-level samples and rewrites winning curves

mod boosted;
mod logistic;
mod model;
mod recalibrator;

pub use boosted::{BoostedStumps, BoostedStumpsConfig, BoostedStumpsModel};
pub use logistic::{LogisticConfig, LogisticModel, LogisticRegression};
pub use model::{
    CalibrationFeatures, CalibrationSample, CalibrationTrainer, LearnerKind, WinProbabilityModel,
};
pub use recalibrator::{CycleReport, LevelOutcome, Recalibrator, MIN_SAMPLES_FOR_RECALIBRATION};
