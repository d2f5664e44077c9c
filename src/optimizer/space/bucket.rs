//! Per-bucket online win-probability estimator.
//!
//! Each bucket keeps a sliding window of the most recent win/loss outcomes
//! on top of a Beta(1, 1) prior, and blends the windowed posterior mean into
//! an exponentially discounted estimate:
//!
//! ```text
//! p ← d × p + (1 − d) × wins / (wins + losses)
//! ```
//!
//! Old evidence leaves the count window after `window_capacity` updates and
//! fades from `p` geometrically, so the estimate tracks a drifting win curve
//! with bounded memory.

use std::collections::VecDeque;

use serde::Serialize;

/// Beta prior pseudo-count for each of wins and losses.
const PRIOR_COUNT: f64 = 1.0;

/// Initial smoothed probability (uninformative).
const INITIAL_PROBABILITY: f64 = 0.5;

/// A contiguous price interval with its own win-rate estimator.
#[derive(Debug, Clone)]
pub struct Bucket {
    lower: f64,
    upper: f64,
    window_capacity: usize,
    discount: f64,
    /// Recent outcomes, oldest at the front
    window: VecDeque<bool>,
    win_count: f64,
    loss_count: f64,
    smoothed: f64,
    sample_count: u64,
}

impl Bucket {
    /// Create an empty bucket over `[lower, upper]`.
    pub fn new(lower: f64, upper: f64, window_capacity: usize, discount: f64) -> Self {
        Self {
            lower,
            upper,
            window_capacity,
            discount,
            window: VecDeque::with_capacity(window_capacity),
            win_count: PRIOR_COUNT,
            loss_count: PRIOR_COUNT,
            smoothed: INITIAL_PROBABILITY,
            sample_count: 0,
        }
    }

    /// Record one auction outcome.
    pub fn update(&mut self, won: bool) {
        self.sample_count += 1;

        if self.window.len() >= self.window_capacity {
            if let Some(oldest) = self.window.pop_front() {
                if oldest {
                    self.win_count -= 1.0;
                } else {
                    self.loss_count -= 1.0;
                }
            }
        }

        self.window.push_back(won);
        if won {
            self.win_count += 1.0;
        } else {
            self.loss_count += 1.0;
        }

        self.smoothed =
            self.discount * self.smoothed + (1.0 - self.discount) * self.windowed_probability();
    }

    /// Posterior mean over the current window (prior included).
    pub fn windowed_probability(&self) -> f64 {
        self.win_count / (self.win_count + self.loss_count)
    }

    /// Whether `price` falls in this bucket (both ends inclusive).
    pub fn contains(&self, price: f64) -> bool {
        self.lower <= price && price <= self.upper
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn mid_price(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }

    pub fn smoothed_probability(&self) -> f64 {
        self.smoothed
    }

    pub fn win_count(&self) -> f64 {
        self.win_count
    }

    pub fn loss_count(&self) -> f64 {
        self.loss_count
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn window_capacity(&self) -> usize {
        self.window_capacity
    }

    /// Lifetime number of updates.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Diagnostic view of the bucket state.
    pub fn stats(&self) -> BucketStats {
        BucketStats {
            lower: self.lower,
            upper: self.upper,
            smoothed_probability: self.smoothed,
            windowed_probability: self.windowed_probability(),
            window_len: self.window.len(),
            sample_count: self.sample_count,
        }
    }
}

/// Serializable bucket diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct BucketStats {
    pub lower: f64,
    pub upper: f64,
    pub smoothed_probability: f64,
    pub windowed_probability: f64,
    pub window_len: usize,
    pub sample_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn assert_count_invariant(b: &Bucket) {
        let expected = (b.sample_count() as usize).min(b.window_capacity()) as f64 + 2.0;
        assert!(
            (b.win_count() + b.loss_count() - expected).abs() < 1e-9,
            "win {} + loss {} != {}",
            b.win_count(),
            b.loss_count(),
            expected
        );
        assert_eq!(b.win_count() + b.loss_count(), b.window_len() as f64 + 2.0);
        assert!(b.window_len() <= b.window_capacity());
    }

    #[test]
    fn test_new_bucket_defaults() {
        let b = Bucket::new(1.0, 2.0, 10, 0.9);
        assert_eq!(b.smoothed_probability(), 0.5);
        assert_eq!(b.win_count(), 1.0);
        assert_eq!(b.loss_count(), 1.0);
        assert_eq!(b.sample_count(), 0);
        assert!((b.mid_price() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_count_invariant_random_sequences() {
        let mut rng = StdRng::seed_from_u64(7);
        for capacity in [10, 11, 25] {
            let mut b = Bucket::new(0.0, 1.0, capacity, 0.8);
            for _ in 0..200 {
                b.update(rng.gen_bool(0.3));
                assert_count_invariant(&b);
            }
        }
    }

    #[test]
    fn test_eviction_undoes_oldest() {
        let mut b = Bucket::new(0.0, 1.0, 10, 0.5);
        for _ in 0..10 {
            b.update(true);
        }
        assert_eq!(b.win_count(), 11.0);
        assert_eq!(b.loss_count(), 1.0);

        // Ten losses push every win out of the window
        for _ in 0..10 {
            b.update(false);
        }
        assert_eq!(b.win_count(), 1.0);
        assert_eq!(b.loss_count(), 11.0);
        assert_eq!(b.sample_count(), 20);
    }

    #[test]
    fn test_smoothed_stays_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(42);
        for discount in [0.0, 0.25, 0.9, 0.999, 1.0] {
            let mut b = Bucket::new(0.0, 1.0, 10, discount);
            for _ in 0..500 {
                b.update(rng.gen_bool(0.5));
                let p = b.smoothed_probability();
                assert!((0.0..=1.0).contains(&p), "p = {p} for discount {discount}");
            }
        }
    }

    #[test]
    fn test_discount_one_freezes_estimate() {
        let mut b = Bucket::new(0.0, 1.0, 10, 1.0);
        for _ in 0..30 {
            b.update(true);
        }
        assert_eq!(b.smoothed_probability(), 0.5);
    }

    #[test]
    fn test_discount_zero_tracks_window() {
        let mut b = Bucket::new(0.0, 1.0, 10, 0.0);
        b.update(true);
        assert!((b.smoothed_probability() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_repeated_wins_increase_strictly() {
        let mut b = Bucket::new(1.0, 2.0, 10, 0.9);
        let mut prev = b.smoothed_probability();
        for i in 0..20 {
            b.update(true);
            let p = b.smoothed_probability();
            assert!(p > prev, "update {i}: {p} <= {prev}");
            prev = p;
        }
    }

    #[test]
    fn test_contains_is_inclusive() {
        let b = Bucket::new(1.0, 2.0, 10, 0.9);
        assert!(b.contains(1.0));
        assert!(b.contains(2.0));
        assert!(!b.contains(2.000_001));
        assert!(!b.contains(f64::NAN));
    }
}
