//! Periodic winning-curve recalibration.
//!
//! For every level of a space:
//!
//! 1. Under the space guard, take the accumulated samples (only when at least
//!    `min_samples` are pending) and snapshot each bucket's features.
//! 2. Outside the guard, fit the pluggable model.
//! 3. Under the guard again, overwrite the level's winning curve with the
//!    model's prediction at every bucket.
//!
//! Drained samples are consumed whatever the training outcome. A failed level
//! keeps its previous curve and the cycle moves on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::model::{CalibrationSample, CalibrationTrainer, WinProbabilityModel};
use crate::errors::TrainingError;
use crate::optimizer::infra::logging::targets;
use crate::optimizer::space::PricingSpace;

/// Minimum pending samples before a level is recalibrated.
pub const MIN_SAMPLES_FOR_RECALIBRATION: usize = 10;

/// What happened to one level during a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelOutcome {
    /// Not enough samples; nothing was touched
    Skipped { pending: usize },
    /// Curve replaced
    Recalibrated { samples: usize },
    /// Samples consumed, curve left unchanged
    Failed { samples: usize, error: TrainingError },
}

/// Result of one recalibration pass over a space.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub context_id: String,
    pub levels: Vec<LevelOutcome>,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn recalibrated(&self) -> usize {
        self.count(|o| matches!(o, LevelOutcome::Recalibrated { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, LevelOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, LevelOutcome::Skipped { .. }))
    }

    fn count(&self, pred: impl Fn(&LevelOutcome) -> bool) -> usize {
        self.levels.iter().filter(|o| pred(o)).count()
    }
}

/// Turns accumulated feedback samples into refreshed winning curves.
#[derive(Debug, Clone)]
pub struct Recalibrator {
    trainer: Arc<dyn CalibrationTrainer>,
    min_samples: usize,
}

impl Recalibrator {
    pub fn new(trainer: Arc<dyn CalibrationTrainer>, min_samples: usize) -> Self {
        Self {
            trainer,
            min_samples,
        }
    }

    pub fn trainer_name(&self) -> &'static str {
        self.trainer.name()
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Recalibrate every level of `space` once.
    pub fn run_cycle(&self, space: &PricingSpace) -> CycleReport {
        let start = Instant::now();
        let levels = (0..space.level_count())
            .map(|idx| self.recalibrate_level(space, idx))
            .collect();

        let report = CycleReport {
            context_id: space.context_id().to_string(),
            levels,
            elapsed: start.elapsed(),
        };

        debug!(
            target: targets::CALIBRATION,
            context = %report.context_id,
            recalibrated = report.recalibrated(),
            failed = report.failed(),
            skipped = report.skipped(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Recalibration cycle complete"
        );
        report
    }

    fn recalibrate_level(&self, space: &PricingSpace, level: usize) -> LevelOutcome {
        let Some(drained) = space.drain_level(level, self.min_samples) else {
            let pending = space.pending_samples().get(level).copied().unwrap_or(0);
            return LevelOutcome::Skipped { pending };
        };
        let n_samples = drained.samples.len();

        let fitted = self.train_guarded(&drained.samples).and_then(|model| {
            drained
                .bucket_features
                .iter()
                .map(|f| {
                    let p = model.predict(f);
                    if p.is_finite() {
                        Ok(p.clamp(0.0, 1.0))
                    } else {
                        Err(TrainingError::Diverged(format!(
                            "non-finite prediction at mid_price={}",
                            f.mid_price
                        )))
                    }
                })
                .collect::<Result<Vec<f64>, TrainingError>>()
        });

        match fitted {
            Ok(curve) => {
                if space.apply_curve(level, curve) {
                    info!(
                        target: targets::CALIBRATION,
                        context = %space.context_id(),
                        level,
                        samples = n_samples,
                        trainer = self.trainer.name(),
                        "Winning curve recalibrated"
                    );
                    return LevelOutcome::Recalibrated { samples: n_samples };
                }
                let error = TrainingError::Diverged("curve length mismatch".to_string());
                warn!(
                    target: targets::CALIBRATION,
                    context = %space.context_id(),
                    level,
                    error = %error,
                    "Recalibration rejected"
                );
                LevelOutcome::Failed {
                    samples: n_samples,
                    error,
                }
            }
            Err(error) => {
                warn!(
                    target: targets::CALIBRATION,
                    context = %space.context_id(),
                    level,
                    samples = n_samples,
                    error = %error,
                    "Recalibration failed, keeping previous curve"
                );
                LevelOutcome::Failed {
                    samples: n_samples,
                    error,
                }
            }
        }
    }

    /// Train, converting a panicking learner into a training error.
    fn train_guarded(
        &self,
        samples: &[CalibrationSample],
    ) -> Result<Box<dyn WinProbabilityModel>, TrainingError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.trainer.train(samples))).unwrap_or_else(
            |payload| {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(TrainingError::Panicked(msg))
            },
        )
    }
}
