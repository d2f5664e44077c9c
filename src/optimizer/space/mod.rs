//! Pricing spaces: one learned win curve per pricing context.
//!
//! A space owns an ensemble of [`Level`]s (independent random partitions of
//! the context's price range), the calibration samples collected since the
//! last recalibration, and a single mutex guarding both.
//!
//! ```text
//! PricingSpace ──Mutex──► levels[l].buckets[b]   (online estimators)
//!                     └─► samples[l]              (recalibration buffer)
//! ```

mod bucket;
pub mod grid;
mod level;

pub use bucket::{Bucket, BucketStats};
pub use level::{Level, INITIAL_CURVE_VALUE};

use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use rand::Rng;
use serde::Serialize;
use tracing::trace;

use super::calibration::{CalibrationFeatures, CalibrationSample};
use super::config::SpaceConfig;
use crate::errors::{ConfigError, Error};
use crate::optimizer::infra::logging::targets;

/// Guarded mutable state of a space.
#[derive(Debug)]
struct SpaceState {
    levels: Vec<Level>,
    /// Calibration samples per level, in arrival order
    samples: Vec<Vec<CalibrationSample>>,
}

/// Learned state for one pricing context.
#[derive(Debug)]
pub struct PricingSpace {
    context_id: String,
    min_price: f64,
    max_price: f64,
    state: Mutex<SpaceState>,
}

/// Samples taken out of a level for training, with the bucket features the
/// resulting model should be evaluated on.
#[derive(Debug, Clone)]
pub(crate) struct DrainedLevel {
    pub samples: Vec<CalibrationSample>,
    pub bucket_features: Vec<CalibrationFeatures>,
}

/// Last recalibrated curve of every level.
///
/// Serializes as `{"level": [{"price": [...], "pr": [...]}, ...]}`, or `{}`
/// when empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurveSnapshot {
    #[serde(rename = "level", skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<LevelCurve>,
}

impl CurveSnapshot {
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Bucket midpoints and the matching winning-curve values for one level.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelCurve {
    #[serde(rename = "price")]
    pub mid_prices: Vec<f64>,
    #[serde(rename = "pr")]
    pub probabilities: Vec<f64>,
}

impl PricingSpace {
    /// Wrap prebuilt levels.
    pub fn new(context_id: impl Into<String>, min_price: f64, max_price: f64, levels: Vec<Level>) -> Self {
        let samples = vec![Vec::new(); levels.len()];
        Self {
            context_id: context_id.into(),
            min_price,
            max_price,
            state: Mutex::new(SpaceState { levels, samples }),
        }
    }

    /// Validate the configuration and build the level ensemble.
    pub fn build<R: Rng + ?Sized>(
        rng: &mut R,
        context_id: impl Into<String>,
        min_price: f64,
        max_price: f64,
        config: &SpaceConfig,
    ) -> Result<Self, ConfigError> {
        let context_id = context_id.into();
        let levels = grid::build_levels(rng, &context_id, min_price, max_price, config)?;
        Ok(Self::new(context_id, min_price, max_price, levels))
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn price_range(&self) -> (f64, f64) {
        (self.min_price, self.max_price)
    }

    pub fn level_count(&self) -> usize {
        self.state.lock().levels.len()
    }

    /// Apply one feedback outcome at `price` to every level covering it.
    ///
    /// Blocks until the space guard is free. Returns the number of levels
    /// that were updated.
    pub fn record_feedback(&self, price: f64, won: bool) -> usize {
        let mut state = self.state.lock();
        Self::apply_feedback(&mut state, price, won)
    }

    /// Like [`record_feedback`](Self::record_feedback) but gives up after
    /// `timeout` with [`Error::SpaceBusy`].
    pub fn try_record_feedback(&self, price: f64, won: bool, timeout: Duration) -> Result<usize, Error> {
        let mut state = self.try_lock(timeout)?;
        Ok(Self::apply_feedback(&mut state, price, won))
    }

    fn try_lock(&self, timeout: Duration) -> Result<MutexGuard<'_, SpaceState>, Error> {
        self.state.try_lock_for(timeout).ok_or_else(|| Error::SpaceBusy {
            context: self.context_id.clone(),
            waited_ms: timeout.as_millis() as u64,
        })
    }

    fn apply_feedback(state: &mut SpaceState, price: f64, won: bool) -> usize {
        let SpaceState { levels, samples } = state;
        let mut updated = 0;

        for (level, level_samples) in levels.iter_mut().zip(samples.iter_mut()) {
            let Some(idx) = level.locate(price) else {
                continue;
            };
            let Some(bucket) = level.bucket_mut(idx) else {
                continue;
            };
            bucket.update(won);
            level_samples.push(CalibrationSample {
                estimate_at_update: bucket.smoothed_probability(),
                mid_price: bucket.mid_price(),
                won,
            });
            updated += 1;
        }

        trace!(target: targets::SPACE, price, won, updated, "Feedback applied");
        updated
    }

    /// Read-only view of the last recalibrated curves.
    pub fn curve_snapshot(&self) -> CurveSnapshot {
        let state = self.state.lock();
        CurveSnapshot {
            levels: state
                .levels
                .iter()
                .map(|level| LevelCurve {
                    mid_prices: level.mid_prices(),
                    probabilities: level.winning_curve().to_vec(),
                })
                .collect(),
        }
    }

    /// Samples waiting for the next recalibration, per level.
    pub fn pending_samples(&self) -> Vec<usize> {
        self.state.lock().samples.iter().map(Vec::len).collect()
    }

    /// Run `f` against level `index` under the guard.
    pub fn with_level<T>(&self, index: usize, f: impl FnOnce(&Level) -> T) -> Option<T> {
        let state = self.state.lock();
        state.levels.get(index).map(f)
    }

    /// Take the level's samples if at least `min_samples` have accumulated.
    ///
    /// Below the threshold nothing is touched and `None` is returned.
    pub(crate) fn drain_level(&self, index: usize, min_samples: usize) -> Option<DrainedLevel> {
        let mut state = self.state.lock();
        let SpaceState { levels, samples } = &mut *state;
        let level = levels.get(index)?;
        let pending = samples.get_mut(index)?;
        if pending.len() < min_samples {
            return None;
        }

        let bucket_features = level
            .buckets()
            .iter()
            .map(|b| CalibrationFeatures::new(b.smoothed_probability(), b.mid_price()))
            .collect();

        Some(DrainedLevel {
            samples: std::mem::take(pending),
            bucket_features,
        })
    }

    /// Replace level `index`'s winning curve.
    pub(crate) fn apply_curve(&self, index: usize, curve: Vec<f64>) -> bool {
        let mut state = self.state.lock();
        state
            .levels
            .get_mut(index)
            .map(|level| level.set_winning_curve(curve))
            .unwrap_or(false)
    }

    /// Run `f` while holding the guard.
    #[cfg(test)]
    pub(crate) fn while_locked<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.state.lock();
        f()
    }
}
