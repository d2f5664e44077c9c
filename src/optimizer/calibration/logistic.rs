//! Logistic regression calibrator.
//!
//! Full-batch gradient descent on L2-regularised cross-entropy over
//! standardised features.

use serde::{Deserialize, Serialize};

use super::model::{
    sigmoid, validate_samples, CalibrationFeatures, CalibrationSample, CalibrationTrainer,
    WinProbabilityModel,
};
use crate::errors::TrainingError;

const N_FEATURES: usize = 2;

/// Hyperparameters for [`LogisticRegression`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogisticConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    /// L2 penalty (bias excluded)
    pub l2: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 0.5,
            l2: 1e-3,
        }
    }
}

/// Fitted logistic model with its feature scaling.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    bias: f64,
    weights: [f64; N_FEATURES],
    means: [f64; N_FEATURES],
    scales: [f64; N_FEATURES],
}

impl LogisticModel {
    fn standardise(&self, x: &[f64; N_FEATURES]) -> [f64; N_FEATURES] {
        let mut z = [0.0; N_FEATURES];
        for k in 0..N_FEATURES {
            z[k] = (x[k] - self.means[k]) / self.scales[k];
        }
        z
    }

    pub fn weights(&self) -> [f64; N_FEATURES] {
        self.weights
    }
}

impl WinProbabilityModel for LogisticModel {
    fn predict(&self, features: &CalibrationFeatures) -> f64 {
        let z = self.standardise(&features.as_array());
        let raw: f64 = self.bias + z.iter().zip(self.weights.iter()).map(|(a, b)| a * b).sum::<f64>();
        sigmoid(raw).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogisticRegression {
    config: LogisticConfig,
}

impl LogisticRegression {
    pub fn new(config: LogisticConfig) -> Self {
        Self { config }
    }

    pub fn fit(&self, samples: &[CalibrationSample]) -> Result<LogisticModel, TrainingError> {
        validate_samples(samples)?;

        let n = samples.len() as f64;
        let xs: Vec<[f64; N_FEATURES]> = samples.iter().map(|s| s.features().as_array()).collect();
        let ys: Vec<f64> = samples.iter().map(CalibrationSample::label).collect();

        let mut means = [0.0; N_FEATURES];
        let mut scales = [1.0; N_FEATURES];
        for k in 0..N_FEATURES {
            means[k] = xs.iter().map(|x| x[k]).sum::<f64>() / n;
            let var = xs.iter().map(|x| (x[k] - means[k]).powi(2)).sum::<f64>() / n;
            if var > 1e-24 {
                scales[k] = var.sqrt();
            }
        }

        let mut model = LogisticModel {
            bias: 0.0,
            weights: [0.0; N_FEATURES],
            means,
            scales,
        };
        let zs: Vec<[f64; N_FEATURES]> = xs.iter().map(|x| model.standardise(x)).collect();

        for _ in 0..self.config.epochs {
            let mut grad_b = 0.0;
            let mut grad_w = [0.0; N_FEATURES];
            for (z, y) in zs.iter().zip(ys.iter()) {
                let raw = model.bias
                    + z.iter()
                        .zip(model.weights.iter())
                        .map(|(a, b)| a * b)
                        .sum::<f64>();
                let err = sigmoid(raw) - y;
                grad_b += err;
                for k in 0..N_FEATURES {
                    grad_w[k] += err * z[k];
                }
            }

            model.bias -= self.config.learning_rate * grad_b / n;
            for k in 0..N_FEATURES {
                let g = grad_w[k] / n + self.config.l2 * model.weights[k];
                model.weights[k] -= self.config.learning_rate * g;
            }
        }

        if !model.bias.is_finite() || model.weights.iter().any(|w| !w.is_finite()) {
            return Err(TrainingError::Diverged(format!(
                "bias={} weights={:?}",
                model.bias, model.weights
            )));
        }

        Ok(model)
    }
}

impl CalibrationTrainer for LogisticRegression {
    fn name(&self) -> &'static str {
        "logistic"
    }

    fn train(
        &self,
        samples: &[CalibrationSample],
    ) -> Result<Box<dyn WinProbabilityModel>, TrainingError> {
        Ok(Box::new(self.fit(samples)?))
    }
}
