//! One partition of a context's price axis.

use super::bucket::Bucket;

/// Winning-curve value before the first recalibration.
pub const INITIAL_CURVE_VALUE: f64 = 0.5;

/// An ordered, contiguous set of buckets covering `[min_price, max_price]`,
/// plus the recalibrated winning curve (one value per bucket).
#[derive(Debug, Clone)]
pub struct Level {
    skew: f64,
    buckets: Vec<Bucket>,
    winning_curve: Vec<f64>,
}

impl Level {
    /// Build a level from buckets already ordered by price.
    pub fn new(skew: f64, buckets: Vec<Bucket>) -> Self {
        let winning_curve = vec![INITIAL_CURVE_VALUE; buckets.len()];
        Self {
            skew,
            buckets,
            winning_curve,
        }
    }

    /// Index of the first bucket containing `price`, or `None` when the price
    /// lies outside this level's range.
    pub fn locate(&self, price: f64) -> Option<usize> {
        self.buckets.iter().position(|b| b.contains(price))
    }

    /// Skew (exponential rate) this level was generated with.
    pub fn skew(&self) -> f64 {
        self.skew
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket_mut(&mut self, index: usize) -> Option<&mut Bucket> {
        self.buckets.get_mut(index)
    }

    pub fn winning_curve(&self) -> &[f64] {
        &self.winning_curve
    }

    /// Replace the whole winning curve.
    ///
    /// A curve whose length differs from the bucket count is rejected and the
    /// previous curve is kept.
    pub fn set_winning_curve(&mut self, curve: Vec<f64>) -> bool {
        if curve.len() != self.buckets.len() {
            return false;
        }
        self.winning_curve = curve;
        true
    }

    /// Midpoint price of every bucket, in order.
    pub fn mid_prices(&self) -> Vec<f64> {
        self.buckets.iter().map(Bucket::mid_price).collect()
    }

    pub fn min_price(&self) -> Option<f64> {
        self.buckets.first().map(Bucket::lower)
    }

    pub fn max_price(&self) -> Option<f64> {
        self.buckets.last().map(Bucket::upper)
    }
}
