//! Synthetic second-party auction with a hidden, drifting win curve.
//!
//! The price range is cut into `FEASIBLE_PRICES - 1` cells. Each cell has a
//! win probability taken from a monotone curve:
//!
//! ```text
//! c_i   = 1 - Exp(1)            (i = 0..N-2, sorted ascending)
//! curve = (c - c_0) / (c_max - c_0)
//! ```
//!
//! so the cheapest cell never wins and the most expensive always does. The
//! curve is redrawn every `CURVE_REFRESH_STEPS` bids.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Exp1};

use crate::errors::ConfigError;
use crate::optimizer::space::grid::validate_range;

/// Grid points spanning the price range
pub const FEASIBLE_PRICES: usize = 51;
/// Bids between curve redraws
pub const CURVE_REFRESH_STEPS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct SyntheticAuction {
    feasible_prices: Vec<f64>,
    curve: Vec<f64>,
    steps: u64,
    rng: StdRng,
}

impl SyntheticAuction {
    pub fn new(min_price: f64, max_price: f64, rng: StdRng) -> Result<Self, ConfigError> {
        validate_range("auction", min_price, max_price)?;
        let span = max_price - min_price;
        let feasible_prices = (0..FEASIBLE_PRICES)
            .map(|i| min_price + span * i as f64 / (FEASIBLE_PRICES - 1) as f64)
            .collect();

        let mut auction = Self {
            feasible_prices,
            curve: Vec::new(),
            steps: 0,
            rng,
        };
        auction.regenerate_curve();
        Ok(auction)
    }

    pub fn price_range(&self) -> (f64, f64) {
        (self.feasible_prices[0], self.feasible_prices[FEASIBLE_PRICES - 1])
    }

    /// Cell midpoints.
    pub fn prices(&self) -> Vec<f64> {
        self.feasible_prices
            .windows(2)
            .map(|w| 0.5 * (w[0] + w[1]))
            .collect()
    }

    /// Current win probability per cell.
    pub fn curve(&self) -> &[f64] {
        &self.curve
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Win probability of a bid at `price`; zero outside the range.
    pub fn win_probability(&self, price: f64) -> f64 {
        self.feasible_prices
            .windows(2)
            .position(|w| w[0] <= price && price <= w[1])
            .map(|i| self.curve[i])
            .unwrap_or(0.0)
    }

    /// Submit one bid. Out-of-range bids never win.
    pub fn step(&mut self, price: f64) -> bool {
        self.steps += 1;
        if self.steps % CURVE_REFRESH_STEPS == 0 {
            self.regenerate_curve();
        }
        let p = self.win_probability(price);
        self.rng.gen::<f64>() < p
    }

    /// Cell price maximising expected margin `(top - p) * curve(p)`.
    pub fn optimal_price(&self) -> f64 {
        let prices = self.prices();
        let top = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prices
            .iter()
            .zip(&self.curve)
            .map(|(&p, &c)| (p, (top - p) * c))
            .fold((prices[0], f64::NEG_INFINITY), |best, (p, v)| {
                if v > best.1 {
                    (p, v)
                } else {
                    best
                }
            })
            .0
    }

    /// Best cell price strictly below `price` for a bidder valuing the item
    /// at `price`; `0.0` when no cell is cheaper.
    pub fn optimal_price_until(&self, price: f64) -> f64 {
        let mut best_value = 0.0;
        let mut best_price = 0.0;
        for (p, c) in self.prices().into_iter().zip(&self.curve) {
            if price - p <= 0.0 {
                break;
            }
            let value = (price - p) * c;
            if best_value <= value {
                best_value = value;
                best_price = p;
            }
        }
        best_price
    }

    fn regenerate_curve(&mut self) {
        let mut curve: Vec<f64> = (0..FEASIBLE_PRICES - 1)
            .map(|_| {
                let draw: f64 = Exp1.sample(&mut self.rng);
                1.0 - draw
            })
            .collect();
        curve.sort_by(f64::total_cmp);

        let lo = curve[0];
        let hi = curve[curve.len() - 1];
        if hi > lo {
            for c in &mut curve {
                *c = (*c - lo) / (hi - lo);
            }
        } else {
            let n = curve.len() - 1;
            for (i, c) in curve.iter_mut().enumerate() {
                *c = i as f64 / n as f64;
            }
        }
        self.curve = curve;
    }
}
