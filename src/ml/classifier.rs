use crate::error::{AppError, Result};
use crate::ml::models::{ModelType, TrainerConfig};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_stats::QuantileExt;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on the curvature of softmax cross-entropy, used to size SDCA steps
const LOSS_SMOOTHNESS: f64 = 1.0;

/// Trait for classifiers
pub trait Classifier: Send + Sync {
    /// Train on a feature matrix and dense class keys in `0..n_classes`
    fn fit(&mut self, features: &Array2<f64>, labels: &[usize], n_classes: usize) -> Result<()>;

    /// Predict class probabilities, one row per sample
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>>;

    /// Predict class keys
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(features)?;
        proba
            .rows()
            .into_iter()
            .map(|row| {
                row.argmax()
                    .map_err(|e| AppError::Inference(format!("Cannot rank scores: {}", e)))
            })
            .collect()
    }

    /// Get model type
    fn model_type(&self) -> ModelType;

    /// Check if model is trained
    fn is_trained(&self) -> bool;
}

/// Multinomial logistic regression trained with stochastic dual coordinate ascent.
///
/// Minimizes mean softmax cross-entropy plus `l2/2 * ||W||^2`. Each example
/// keeps one dual variable per class; visiting an example moves its duals
/// toward `onehot(y) - p(x)` and applies the matching primal update, so the
/// weights always equal `sum_i alpha_i x_i^T / (l2 * n)`. A constant bias
/// feature is appended to every row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdcaMaximumEntropy {
    /// Trainer settings
    config: TrainerConfig,

    /// Example order seed
    seed: u64,

    /// Class weights, shape (n_classes, n_features + 1), bias in the last column
    weights: Option<Array2<f64>>,

    /// Epochs run by the last fit
    epochs_run: usize,
}

impl SdcaMaximumEntropy {
    pub fn new(config: TrainerConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            weights: None,
            epochs_run: 0,
        }
    }

    /// Number of input features the model expects
    pub fn n_features(&self) -> Option<usize> {
        self.weights.as_ref().map(|w| w.ncols() - 1)
    }

    /// Number of classes the model scores
    pub fn n_classes(&self) -> Option<usize> {
        self.weights.as_ref().map(|w| w.nrows())
    }

    pub fn epochs_run(&self) -> usize {
        self.epochs_run
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    fn with_bias(features: &Array2<f64>) -> Array2<f64> {
        let mut augmented = Array2::ones((features.nrows(), features.ncols() + 1));
        augmented
            .slice_mut(ndarray::s![.., ..features.ncols()])
            .assign(features);
        augmented
    }

    fn class_scores(weights: &Array2<f64>, x: ArrayView1<f64>) -> Result<Array1<f64>> {
        softmax(weights.dot(&x))
    }
}

impl Classifier for SdcaMaximumEntropy {
    fn fit(&mut self, features: &Array2<f64>, labels: &[usize], n_classes: usize) -> Result<()> {
        let n_samples = features.nrows();
        if n_samples == 0 {
            return Err(AppError::Training("Empty training set".to_string()));
        }
        if labels.len() != n_samples {
            return Err(AppError::Training(format!(
                "Mismatched training inputs/labels: {} rows, {} labels",
                n_samples,
                labels.len()
            )));
        }
        if n_classes == 0 {
            return Err(AppError::Training(
                "No classes available for training".to_string(),
            ));
        }
        if let Some(&bad) = labels.iter().find(|&&y| y >= n_classes) {
            return Err(AppError::Training(format!(
                "Label key {} out of range for {} classes",
                bad, n_classes
            )));
        }

        let x = Self::with_bias(features);
        let lambda_n = self.config.l2_regularization * n_samples as f64;
        let squared_norms: Vec<f64> = x.rows().into_iter().map(|row| row.dot(&row)).collect();

        let mut weights = Array2::<f64>::zeros((n_classes, x.ncols()));
        let mut duals = Array2::<f64>::zeros((n_samples, n_classes));
        let mut order: Vec<usize> = (0..n_samples).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);

        self.epochs_run = 0;
        for epoch in 0..self.config.max_epochs {
            order.shuffle(&mut rng);
            let mut largest_step = 0.0f64;

            for &i in &order {
                let row = x.row(i);
                let proba = Self::class_scores(&weights, row)?;
                let step = lambda_n / (lambda_n + LOSS_SMOOTHNESS * squared_norms[i]);
                let row_max = row.iter().fold(0.0f64, |m, v| m.max(v.abs()));

                for class in 0..n_classes {
                    let target = if labels[i] == class { 1.0 } else { 0.0 };
                    let residual = target - proba[class] - duals[[i, class]];
                    let delta = step * residual;
                    if delta == 0.0 {
                        continue;
                    }
                    duals[[i, class]] += delta;

                    let scale = delta / lambda_n;
                    weights.row_mut(class).scaled_add(scale, &row);
                    largest_step = largest_step.max(scale.abs() * row_max);
                }
            }

            self.epochs_run = epoch + 1;
            let largest_weight = weights.iter().fold(0.0f64, |m, w| m.max(w.abs()));
            debug!(epoch, largest_step, largest_weight, "SDCA epoch finished");

            if largest_weight == 0.0
                || largest_step <= self.config.convergence_tolerance * largest_weight
            {
                break;
            }
        }

        self.weights = Some(weights);
        Ok(())
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        let weights = self
            .weights
            .as_ref()
            .ok_or_else(|| AppError::Inference("Model not trained".to_string()))?;

        if features.ncols() + 1 != weights.ncols() {
            return Err(AppError::Inference(format!(
                "Feature dimension mismatch: model expects {}, got {}",
                weights.ncols() - 1,
                features.ncols()
            )));
        }

        let x = Self::with_bias(features);
        let mut proba = Array2::zeros((x.nrows(), weights.nrows()));
        for (mut out, row) in proba.axis_iter_mut(Axis(0)).zip(x.rows()) {
            out.assign(&Self::class_scores(weights, row)?);
        }

        Ok(proba)
    }

    fn model_type(&self) -> ModelType {
        ModelType::SdcaMaximumEntropy
    }

    fn is_trained(&self) -> bool {
        self.weights.is_some()
    }
}

/// Numerically stable softmax
pub fn softmax(logits: Array1<f64>) -> Result<Array1<f64>> {
    let max = *logits
        .max()
        .map_err(|e| AppError::Inference(format!("Invalid logits: {}", e)))?;
    let mut exp = logits.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp /= sum;
    Ok(exp)
}
