//! Gradient-boosted decision stumps for binary win calibration.
//!
//! Additive log-odds model over the two calibration features:
//!
//! ```text
//! F(x) = F_0 + Σ_r η × stump_r(x)
//! P(win | x) = σ(F(x))
//! ```
//!
//! Each round takes one Newton step on log-loss. With per-sample gradient
//! `g = p − y` and hessian `h = p(1 − p)`, a stump picks the single split that
//! maximises
//!
//! ```text
//! gain = G_L² / (H_L + λ) + G_R² / (H_R + λ) − G² / (H + λ)
//! ```
//!
//! and predicts `−G / (H + λ)` on each side.

use serde::{Deserialize, Serialize};

use super::model::{
    sigmoid, validate_samples, CalibrationFeatures, CalibrationSample, CalibrationTrainer,
    WinProbabilityModel,
};
use crate::errors::TrainingError;

/// Number of input features.
const N_FEATURES: usize = 2;

/// Hessian floor to keep leaf weights bounded on pure leaves.
const MIN_HESSIAN: f64 = 1e-6;

/// Hyperparameters for [`BoostedStumps`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BoostedStumpsConfig {
    /// Boosting rounds
    pub rounds: usize,
    /// Shrinkage applied to every stump
    pub learning_rate: f64,
    /// L2 penalty on leaf weights
    pub l2: f64,
    /// Minimum hessian mass on each side of a split
    pub min_child_weight: f64,
}

impl Default for BoostedStumpsConfig {
    fn default() -> Self {
        Self {
            rounds: 10,
            learning_rate: 0.3,
            l2: 1.0,
            min_child_weight: 1e-3,
        }
    }
}

/// One depth-1 tree.
#[derive(Debug, Clone, Copy)]
struct Stump {
    feature: usize,
    threshold: f64,
    left: f64,
    right: f64,
}

impl Stump {
    fn eval(&self, x: &[f64; N_FEATURES]) -> f64 {
        if x[self.feature] <= self.threshold {
            self.left
        } else {
            self.right
        }
    }
}

/// Fitted boosted-stump ensemble.
#[derive(Debug, Clone)]
pub struct BoostedStumpsModel {
    base_score: f64,
    stumps: Vec<Stump>,
}

impl BoostedStumpsModel {
    fn raw_score(&self, x: &[f64; N_FEATURES]) -> f64 {
        self.base_score + self.stumps.iter().map(|s| s.eval(x)).sum::<f64>()
    }

    pub fn n_stumps(&self) -> usize {
        self.stumps.len()
    }
}

impl WinProbabilityModel for BoostedStumpsModel {
    fn predict(&self, features: &CalibrationFeatures) -> f64 {
        sigmoid(self.raw_score(&features.as_array())).clamp(0.0, 1.0)
    }
}

/// Trainer for [`BoostedStumpsModel`].
#[derive(Debug, Clone, Default)]
pub struct BoostedStumps {
    config: BoostedStumpsConfig,
}

impl BoostedStumps {
    pub fn new(config: BoostedStumpsConfig) -> Self {
        Self { config }
    }

    pub fn fit(&self, samples: &[CalibrationSample]) -> Result<BoostedStumpsModel, TrainingError> {
        validate_samples(samples)?;

        let xs: Vec<[f64; N_FEATURES]> = samples.iter().map(|s| s.features().as_array()).collect();
        let ys: Vec<f64> = samples.iter().map(CalibrationSample::label).collect();

        // Smoothed log-odds of the positive rate
        let positives: f64 = ys.iter().sum();
        let negatives = ys.len() as f64 - positives;
        let base_score = ((positives + 0.5) / (negatives + 0.5)).ln();

        let mut scores = vec![base_score; xs.len()];
        let mut stumps = Vec::with_capacity(self.config.rounds);

        // Sort orders are fixed across rounds
        let orders: Vec<Vec<usize>> = (0..N_FEATURES)
            .map(|k| {
                let mut idx: Vec<usize> = (0..xs.len()).collect();
                idx.sort_by(|&a, &b| xs[a][k].total_cmp(&xs[b][k]));
                idx
            })
            .collect();

        for _ in 0..self.config.rounds {
            let (grad, hess): (Vec<f64>, Vec<f64>) = scores
                .iter()
                .zip(ys.iter())
                .map(|(f, y)| {
                    let p = sigmoid(*f);
                    (p - y, (p * (1.0 - p)).max(MIN_HESSIAN))
                })
                .unzip();

            let stump = self.best_stump(&xs, &orders, &grad, &hess);
            if !stump.left.is_finite() || !stump.right.is_finite() {
                return Err(TrainingError::Diverged(format!(
                    "non-finite leaf weight on feature {}",
                    stump.feature
                )));
            }

            for (score, x) in scores.iter_mut().zip(xs.iter()) {
                *score += stump.eval(x);
            }
            stumps.push(stump);
        }

        Ok(BoostedStumpsModel { base_score, stumps })
    }

    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.config.l2) * self.config.learning_rate
    }

    fn best_stump(
        &self,
        xs: &[[f64; N_FEATURES]],
        orders: &[Vec<usize>],
        grad: &[f64],
        hess: &[f64],
    ) -> Stump {
        let l2 = self.config.l2;
        let g_total: f64 = grad.iter().sum();
        let h_total: f64 = hess.iter().sum();
        let parent = g_total * g_total / (h_total + l2);

        // No split: a single constant leaf
        let constant = self.leaf_weight(g_total, h_total);
        let mut best = Stump {
            feature: 0,
            threshold: f64::INFINITY,
            left: constant,
            right: constant,
        };
        let mut best_gain = 0.0;

        for (k, order) in orders.iter().enumerate() {
            let mut g_left = 0.0;
            let mut h_left = 0.0;
            for pos in 0..order.len().saturating_sub(1) {
                let i = order[pos];
                g_left += grad[i];
                h_left += hess[i];

                let here = xs[i][k];
                let next = xs[order[pos + 1]][k];
                if next <= here {
                    continue;
                }

                let g_right = g_total - g_left;
                let h_right = h_total - h_left;
                if h_left < self.config.min_child_weight || h_right < self.config.min_child_weight
                {
                    continue;
                }

                let gain =
                    g_left * g_left / (h_left + l2) + g_right * g_right / (h_right + l2) - parent;
                if gain > best_gain {
                    best_gain = gain;
                    best = Stump {
                        feature: k,
                        threshold: (here + next) / 2.0,
                        left: self.leaf_weight(g_left, h_left),
                        right: self.leaf_weight(g_right, h_right),
                    };
                }
            }
        }

        best
    }
}

impl CalibrationTrainer for BoostedStumps {
    fn name(&self) -> &'static str {
        "boosted_stumps"
    }

    fn train(
        &self,
        samples: &[CalibrationSample],
    ) -> Result<Box<dyn WinProbabilityModel>, TrainingError> {
        Ok(Box::new(self.fit(samples)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(estimate: f64, mid_price: f64, won: bool) -> CalibrationSample {
        CalibrationSample {
            estimate_at_update: estimate,
            mid_price,
            won,
        }
    }

    #[test]
    fn test_separates_on_price() {
        // Cheap bids lose, expensive bids win
        let mut samples = Vec::new();
        for i in 0..40 {
            let price = 1.0 + i as f64 / 40.0;
            samples.push(sample(0.5, price, price > 1.5));
        }

        let model = BoostedStumps::default().fit(&samples).unwrap();
        assert_eq!(model.n_stumps(), 10);

        let low = model.predict(&CalibrationFeatures::new(0.5, 1.1));
        let high = model.predict(&CalibrationFeatures::new(0.5, 1.9));
        assert!(high > 0.8, "high = {high}");
        assert!(low < 0.2, "low = {low}");
    }

    #[test]
    fn test_single_class_stays_bounded() {
        let samples: Vec<_> = (0..20).map(|i| sample(0.9, i as f64, true)).collect();
        let model = BoostedStumps::default().fit(&samples).unwrap();
        let p = model.predict(&CalibrationFeatures::new(0.9, 5.0));
        assert!(p > 0.5 && p <= 1.0, "p = {p}");
    }

    #[test]
    fn test_constant_features_predict_base_rate() {
        let mut samples = Vec::new();
        for i in 0..30 {
            samples.push(sample(0.5, 1.0, i % 3 == 0));
        }
        let model = BoostedStumps::default().fit(&samples).unwrap();
        let p = model.predict(&CalibrationFeatures::new(0.5, 1.0));
        assert!((p - 1.0 / 3.0).abs() < 0.05, "p = {p}");
    }

    #[test]
    fn test_rejects_non_finite() {
        let samples = vec![sample(0.5, 1.0, true), sample(0.5, f64::INFINITY, false)];
        assert_eq!(
            BoostedStumps::default().fit(&samples).unwrap_err(),
            TrainingError::NonFiniteInput(1)
        );
    }
}
