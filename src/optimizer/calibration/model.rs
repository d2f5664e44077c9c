//! Training contract for winning-curve calibration.
//!
//! The recalibrator only sees these two traits, so any binary classifier can
//! sit behind it:
//!
//! ```text
//! CalibrationTrainer::train(&[CalibrationSample]) -> Box<dyn WinProbabilityModel>
//! WinProbabilityModel::predict(CalibrationFeatures) -> P(win)
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::boosted::{BoostedStumps, BoostedStumpsConfig};
use super::logistic::{LogisticConfig, LogisticRegression};
use crate::errors::TrainingError;

/// Model inputs: the bucket's smoothed estimate and its midpoint price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationFeatures {
    pub estimate: f64,
    pub mid_price: f64,
}

impl CalibrationFeatures {
    pub fn new(estimate: f64, mid_price: f64) -> Self {
        Self {
            estimate,
            mid_price,
        }
    }

    pub(crate) fn as_array(&self) -> [f64; 2] {
        [self.estimate, self.mid_price]
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.estimate.is_finite() && self.mid_price.is_finite()
    }
}

/// One feedback event captured for the next recalibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationSample {
    /// Bucket smoothed probability right after the update
    pub estimate_at_update: f64,
    /// Bucket midpoint price
    pub mid_price: f64,
    /// Whether the bid won the impression
    pub won: bool,
}

impl CalibrationSample {
    pub fn features(&self) -> CalibrationFeatures {
        CalibrationFeatures::new(self.estimate_at_update, self.mid_price)
    }

    pub(crate) fn label(&self) -> f64 {
        if self.won {
            1.0
        } else {
            0.0
        }
    }
}

/// A fitted binary model.
pub trait WinProbabilityModel: Send + Sync {
    /// Probability of winning, in [0, 1].
    fn predict(&self, features: &CalibrationFeatures) -> f64;
}

/// Fits a [`WinProbabilityModel`] from labelled samples.
pub trait CalibrationTrainer: Send + Sync + fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn train(
        &self,
        samples: &[CalibrationSample],
    ) -> Result<Box<dyn WinProbabilityModel>, TrainingError>;
}

/// Reject empty sets and non-finite features.
pub(crate) fn validate_samples(samples: &[CalibrationSample]) -> Result<(), TrainingError> {
    if samples.is_empty() {
        return Err(TrainingError::InsufficientSamples { got: 0, need: 1 });
    }
    if let Some(idx) = samples.iter().position(|s| !s.features().is_finite()) {
        return Err(TrainingError::NonFiniteInput(idx));
    }
    Ok(())
}

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Learner selection for the service configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    /// Gradient-boosted decision stumps on log-loss
    #[default]
    BoostedStumps,
    /// L2-regularised logistic regression
    Logistic,
}

impl LearnerKind {
    /// Instantiate the trainer with its default hyperparameters.
    pub fn trainer(&self) -> Arc<dyn CalibrationTrainer> {
        match self {
            LearnerKind::BoostedStumps => {
                Arc::new(BoostedStumps::new(BoostedStumpsConfig::default()))
            }
            LearnerKind::Logistic => Arc::new(LogisticRegression::new(LogisticConfig::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_samples() {
        assert_eq!(
            validate_samples(&[]),
            Err(TrainingError::InsufficientSamples { got: 0, need: 1 })
        );

        let good = CalibrationSample {
            estimate_at_update: 0.5,
            mid_price: 1.0,
            won: true,
        };
        let bad = CalibrationSample {
            estimate_at_update: f64::NAN,
            ..good
        };
        assert!(validate_samples(&[good]).is_ok());
        assert_eq!(
            validate_samples(&[good, bad]),
            Err(TrainingError::NonFiniteInput(1))
        );
    }

    #[test]
    fn test_learner_kind_serde() {
        let kind: LearnerKind = serde_json::from_str("\"logistic\"").unwrap();
        assert_eq!(kind, LearnerKind::Logistic);
        assert_eq!(kind.trainer().name(), "logistic");
        assert_eq!(LearnerKind::default().trainer().name(), "boosted_stumps");
    }

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(50.0) > 0.999);
        assert!(sigmoid(-50.0) < 0.001);
    }
}
