use crate::error::{AppError, Result};
use crate::ml::models::{ClassMetrics, ModelMetrics};
use crate::ml::pipeline::{columns, DataView, EstimatorChain, FittedPipeline};
use ndarray::{Array1, Array2};
use ndarray_stats::QuantileExt;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Probabilities are clamped here before taking logs
const MIN_PROBABILITY: f64 = 1e-15;

/// Mean and sample standard deviation of one metric across folds
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std_dev: f64,
}

impl MetricSummary {
    fn from_values(values: &[f64]) -> Self {
        let values = Array1::from(values.to_vec());
        let mean = values.mean().unwrap_or(0.0);
        let std_dev = if values.len() > 1 { values.std(1.0) } else { 0.0 };
        Self { mean, std_dev }
    }
}

impl std::fmt::Display for MetricSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4} (+/- {:.4})", self.mean, self.std_dev)
    }
}

/// Outcome of k-fold cross-validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationReport {
    /// Folds requested after clamping to the row count
    pub folds: usize,

    /// Metrics of every fold, in fold order
    pub per_fold: Vec<ModelMetrics>,

    pub micro_accuracy: MetricSummary,
    pub macro_accuracy: MetricSummary,
    pub log_loss: MetricSummary,
    pub log_loss_reduction: MetricSummary,
    pub top_k_accuracy: MetricSummary,
}

impl CrossValidationReport {
    fn from_folds(folds: usize, per_fold: Vec<ModelMetrics>) -> Self {
        let evaluated: Vec<&ModelMetrics> =
            per_fold.iter().filter(|m| m.n_evaluated > 0).collect();
        let summary = |metric: fn(&ModelMetrics) -> f64| {
            let values: Vec<f64> = evaluated.iter().map(|m| metric(m)).collect();
            MetricSummary::from_values(&values)
        };

        Self {
            folds,
            micro_accuracy: summary(|m| m.micro_accuracy),
            macro_accuracy: summary(|m| m.macro_accuracy),
            log_loss: summary(|m| m.log_loss),
            log_loss_reduction: summary(|m| m.log_loss_reduction),
            top_k_accuracy: summary(|m| m.top_k_accuracy),
            per_fold,
        }
    }

    /// Log the headline numbers
    pub fn log(&self) {
        info!(
            folds = self.folds,
            micro_accuracy = %self.micro_accuracy,
            macro_accuracy = %self.macro_accuracy,
            log_loss = %self.log_loss,
            log_loss_reduction = %self.log_loss_reduction,
            top_k_accuracy = %self.top_k_accuracy,
            "Cross-validation finished"
        );
    }
}

/// Deal shuffled row indices round-robin into `folds` buckets
pub fn assign_folds(n_rows: usize, folds: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut buckets = vec![Vec::new(); folds];
    for (position, row) in order.into_iter().enumerate() {
        buckets[position % folds].push(row);
    }
    buckets
}

/// Estimate generalization quality of `chain` with k-fold cross-validation.
///
/// Returns `None` when there are fewer than two rows. The chain is refit from
/// scratch for every fold, featurizers included.
pub fn cross_validate(
    chain: &EstimatorChain,
    data: &DataView,
    label_column: &str,
    folds: usize,
    seed: u64,
    top_k: usize,
) -> Result<Option<CrossValidationReport>> {
    let n_rows = data.n_rows();
    if n_rows < 2 {
        warn!(rows = n_rows, "Too few rows for cross-validation, skipping");
        return Ok(None);
    }

    let folds = folds.min(n_rows);
    if folds < 2 {
        return Err(AppError::Validation(
            "cross-validation needs at least 2 folds".to_string(),
        ));
    }

    let buckets = assign_folds(n_rows, folds, seed);
    let mut per_fold = Vec::with_capacity(folds);

    for (fold, held_out) in buckets.iter().enumerate() {
        let train_rows: Vec<usize> = buckets
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != fold)
            .flat_map(|(_, rows)| rows.iter().copied())
            .collect();

        let train = data.select_rows(&train_rows);
        let test = data.select_rows(held_out);

        let fitted = chain.fit(&train)?;
        let metrics = evaluate(&fitted, &train, &test, label_column, top_k)?;
        debug!(
            fold,
            train_rows = train_rows.len(),
            test_rows = held_out.len(),
            micro_accuracy = metrics.micro_accuracy,
            log_loss = metrics.log_loss,
            "Fold evaluated"
        );
        per_fold.push(metrics);
    }

    Ok(Some(CrossValidationReport::from_folds(folds, per_fold)))
}

/// Score `test` with a fitted pipeline and compare against its label column.
///
/// `train` supplies the label prior for log-loss reduction. Rows whose label
/// the pipeline has never seen are skipped.
pub fn evaluate(
    pipeline: &FittedPipeline,
    train: &DataView,
    test: &DataView,
    label_column: &str,
    top_k: usize,
) -> Result<ModelMetrics> {
    let dictionary = pipeline
        .label_dictionary()
        .ok_or_else(|| AppError::Internal("Pipeline has no classifier".to_string()))?;

    let mut prior = Array1::<f64>::zeros(dictionary.len());
    for label in train.text(label_column)? {
        if let Some(key) = dictionary.key_of(label) {
            prior[key] += 1.0;
        }
    }
    let total = prior.sum();
    if total > 0.0 {
        prior /= total;
    }

    let truth: Vec<Option<usize>> = test
        .text(label_column)?
        .iter()
        .map(|label| dictionary.key_of(label))
        .collect();

    let scored = pipeline.transform(test.clone())?;
    let (scores, _) = scored.vector(columns::SCORE)?;

    let kept: Vec<usize> = truth
        .iter()
        .enumerate()
        .filter_map(|(row, key)| key.map(|_| row))
        .collect();
    let y_true: Vec<usize> = kept.iter().filter_map(|&row| truth[row]).collect();
    let proba = scores.select(ndarray::Axis(0), &kept);

    let mut metrics = multiclass_metrics(&y_true, &proba, dictionary.labels(), &prior, top_k)?;
    metrics.n_skipped = truth.len() - kept.len();
    Ok(metrics)
}

/// Multiclass metrics from true keys and per-class probabilities
pub fn multiclass_metrics(
    y_true: &[usize],
    proba: &Array2<f64>,
    class_names: &[String],
    prior: &Array1<f64>,
    top_k: usize,
) -> Result<ModelMetrics> {
    let n_samples = y_true.len();
    if n_samples == 0 {
        return Ok(ModelMetrics {
            top_k,
            ..ModelMetrics::new()
        });
    }
    let n_classes = class_names.len();

    let y_pred = proba
        .rows()
        .into_iter()
        .map(|row| {
            row.argmax()
                .map_err(|e| AppError::Inference(format!("Cannot rank scores: {}", e)))
        })
        .collect::<Result<Vec<usize>>>()?;

    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    let micro_accuracy = correct as f64 / n_samples as f64;

    let mut log_loss = 0.0;
    let mut prior_log_loss = 0.0;
    let mut in_top_k = 0;
    for (row, &truth) in proba.rows().into_iter().zip(y_true) {
        log_loss -= row[truth].max(MIN_PROBABILITY).ln();
        prior_log_loss -= prior[truth].max(MIN_PROBABILITY).ln();

        let better = row.iter().filter(|&&p| p > row[truth]).count();
        if better < top_k {
            in_top_k += 1;
        }
    }
    log_loss /= n_samples as f64;
    prior_log_loss /= n_samples as f64;
    let log_loss_reduction = if prior_log_loss > 0.0 {
        (prior_log_loss - log_loss) / prior_log_loss
    } else {
        0.0
    };

    let mut per_class = BTreeMap::new();
    let mut recall_sum = 0.0;
    let mut classes_present = 0;

    for class_idx in 0..n_classes {
        let tp = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| **t == class_idx && **p == class_idx)
            .count();

        let fp = y_pred
            .iter()
            .zip(y_true.iter())
            .filter(|(p, t)| **p == class_idx && **t != class_idx)
            .count();

        let fn_count = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| **t == class_idx && **p != class_idx)
            .count();

        let support = tp + fn_count;
        if support == 0 && fp == 0 {
            continue;
        }

        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };

        let recall = if support > 0 {
            tp as f64 / support as f64
        } else {
            0.0
        };

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        if support > 0 {
            recall_sum += recall;
            classes_present += 1;
        }

        per_class.insert(
            class_names[class_idx].clone(),
            ClassMetrics {
                precision,
                recall,
                f1_score: f1,
                support,
            },
        );
    }

    Ok(ModelMetrics {
        micro_accuracy,
        macro_accuracy: if classes_present > 0 {
            recall_sum / classes_present as f64
        } else {
            0.0
        },
        log_loss,
        log_loss_reduction,
        top_k_accuracy: in_top_k as f64 / n_samples as f64,
        top_k,
        n_evaluated: n_samples,
        n_skipped: 0,
        per_class_metrics: per_class,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::TrainingConfig;
    use crate::ml::pipeline::build_training_pipeline;
    use crate::models::TrainingInput;
    use ndarray::array;

    fn names(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn training_rows(n_per_class: usize) -> Vec<TrainingInput> {
        let mut rows = Vec::new();
        for i in 0..n_per_class {
            rows.push(TrainingInput {
                title: format!("login failure {}", i),
                description: "user cannot sign in with password".to_string(),
                fixer: "Alice".to_string(),
            });
            rows.push(TrainingInput {
                title: format!("export timeout {}", i),
                description: "csv report export is slow".to_string(),
                fixer: "Bob".to_string(),
            });
        }
        rows
    }

    #[test]
    fn test_perfect_predictions() {
        let proba = array![[0.9, 0.1], [0.2, 0.8], [0.7, 0.3]];
        let prior = array![0.5, 0.5];
        let metrics =
            multiclass_metrics(&[0, 1, 0], &proba, &names(&["A", "B"]), &prior, 1).unwrap();

        assert_eq!(metrics.micro_accuracy, 1.0);
        assert_eq!(metrics.macro_accuracy, 1.0);
        assert_eq!(metrics.top_k_accuracy, 1.0);
        assert!(metrics.log_loss > 0.0);
        assert!(metrics.log_loss_reduction > 0.0);
        assert_eq!(metrics.per_class_metrics["A"].support, 2);
    }

    #[test]
    fn test_macro_differs_from_micro() {
        // class A: 3 of 3 right, class B: 0 of 1 right
        let proba = array![[0.9, 0.1], [0.8, 0.2], [0.7, 0.3], [0.6, 0.4]];
        let prior = array![0.75, 0.25];
        let metrics =
            multiclass_metrics(&[0, 0, 0, 1], &proba, &names(&["A", "B"]), &prior, 2).unwrap();

        assert_eq!(metrics.micro_accuracy, 0.75);
        assert_eq!(metrics.macro_accuracy, 0.5);
        assert_eq!(metrics.top_k_accuracy, 1.0);
        assert_eq!(metrics.per_class_metrics["B"].recall, 0.0);
    }

    #[test]
    fn test_empty_evaluation() {
        let metrics = multiclass_metrics(
            &[],
            &Array2::zeros((0, 2)),
            &names(&["A", "B"]),
            &array![0.5, 0.5],
            3,
        )
        .unwrap();
        assert_eq!(metrics.n_evaluated, 0);
        assert_eq!(metrics.top_k, 3);
    }

    #[test]
    fn test_tied_scores_pick_first_class() {
        let proba = array![[0.5, 0.5], [0.5, 0.5]];
        let prior = array![0.5, 0.5];
        let metrics =
            multiclass_metrics(&[0, 1], &proba, &names(&["A", "B"]), &prior, 1).unwrap();

        assert_eq!(metrics.micro_accuracy, 0.5);
        assert_eq!(metrics.per_class_metrics["A"].recall, 1.0);
        assert_eq!(metrics.per_class_metrics["B"].recall, 0.0);
    }

    #[test]
    fn test_nan_scores_are_an_error() {
        let proba = array![[f64::NAN, 0.5]];
        let err = multiclass_metrics(&[0], &proba, &names(&["A", "B"]), &array![0.5, 0.5], 1)
            .unwrap_err();
        assert!(matches!(err, AppError::Inference(_)));
    }

    #[test]
    fn test_assign_folds_partitions_rows() {
        let buckets = assign_folds(13, 6, 42);
        assert_eq!(buckets.len(), 6);

        let mut all: Vec<usize> = buckets.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..13).collect::<Vec<_>>());
        assert!(buckets.iter().all(|b| b.len() == 2 || b.len() == 3));

        assert_eq!(buckets, assign_folds(13, 6, 42));
    }

    #[test]
    fn test_cross_validate_reports_every_fold() {
        let data = DataView::from_training_inputs(&training_rows(6));
        let config = TrainingConfig::default();
        let chain = build_training_pipeline(&config);

        let report = cross_validate(&chain, &data, columns::FIXER, 6, config.seed, 3)
            .unwrap()
            .expect("enough rows");

        assert_eq!(report.folds, 6);
        assert_eq!(report.per_fold.len(), 6);
        assert!(report.micro_accuracy.mean > 0.5);
        assert!(report.micro_accuracy.mean <= 1.0);
    }

    #[test]
    fn test_cross_validate_clamps_and_skips() {
        let config = TrainingConfig::default();
        let chain = build_training_pipeline(&config);

        let single = DataView::from_training_inputs(&training_rows(1)[..1]);
        assert!(cross_validate(&chain, &single, columns::FIXER, 6, 1, 3)
            .unwrap()
            .is_none());

        let data = DataView::from_training_inputs(&training_rows(2));
        let report = cross_validate(&chain, &data, columns::FIXER, 6, 1, 3)
            .unwrap()
            .unwrap();
        assert_eq!(report.folds, 4);
    }

    #[test]
    fn test_unseen_labels_are_skipped() {
        let config = TrainingConfig::default();
        let train_rows = training_rows(2);
        let train = DataView::from_training_inputs(&train_rows);
        let fitted = build_training_pipeline(&config).fit(&train).unwrap();

        let test = DataView::from_training_inputs(&[
            TrainingInput {
                title: "login failure".to_string(),
                description: "cannot sign in".to_string(),
                fixer: "Alice".to_string(),
            },
            TrainingInput {
                title: "printer jam".to_string(),
                description: "paper stuck".to_string(),
                fixer: "Carol".to_string(),
            },
        ]);

        let metrics = evaluate(&fitted, &train, &test, columns::FIXER, 3).unwrap();
        assert_eq!(metrics.n_evaluated, 1);
        assert_eq!(metrics.n_skipped, 1);
    }
}
