use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use validator::Validate;

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrainingConfig {
    /// Seed for fold assignment and SDCA example order
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of cross-validation folds
    #[serde(default = "default_folds")]
    #[validate(range(min = 2, max = 100))]
    pub cross_validation_folds: usize,

    /// Text featurization settings
    #[serde(default)]
    #[validate(nested)]
    pub features: FeatureConfig,

    /// Classifier settings
    #[serde(default)]
    #[validate(nested)]
    pub trainer: TrainerConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            cross_validation_folds: default_folds(),
            features: FeatureConfig::default(),
            trainer: TrainerConfig::default(),
        }
    }
}

/// Feature extraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FeatureConfig {
    /// Word n-grams of every length up to this one are produced
    #[serde(default = "default_word_ngram_length")]
    #[validate(range(min = 1, max = 5))]
    pub word_ngram_length: usize,

    /// Character n-gram length, 0 disables character n-grams
    #[serde(default = "default_char_ngram_length")]
    #[validate(range(max = 8))]
    pub char_ngram_length: usize,

    /// Minimum document frequency for terms
    #[serde(default = "default_min_doc_freq")]
    #[validate(range(min = 1))]
    pub min_doc_freq: usize,

    /// Maximum vocabulary size per text column
    #[serde(default)]
    pub max_vocab_size: Option<usize>,

    /// Use TF-IDF weighting instead of raw term frequency
    #[serde(default)]
    pub use_tfidf: bool,

    /// Drop common English stopwords before building word n-grams
    #[serde(default)]
    pub remove_stopwords: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            word_ngram_length: default_word_ngram_length(),
            char_ngram_length: default_char_ngram_length(),
            min_doc_freq: default_min_doc_freq(),
            max_vocab_size: None,
            use_tfidf: false,
            remove_stopwords: false,
        }
    }
}

/// SDCA maximum-entropy trainer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TrainerConfig {
    /// L2 regularization strength
    #[serde(default = "default_l2")]
    #[validate(range(min = 0.000001))]
    pub l2_regularization: f64,

    /// Maximum passes over the training data
    #[serde(default = "default_max_epochs")]
    #[validate(range(min = 1))]
    pub max_epochs: usize,

    /// Stop once an epoch moves no weight by more than this fraction of the largest weight
    #[serde(default = "default_tolerance")]
    #[validate(range(min = 0.0))]
    pub convergence_tolerance: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            l2_regularization: default_l2(),
            max_epochs: default_max_epochs(),
            convergence_tolerance: default_tolerance(),
        }
    }
}

fn default_seed() -> u64 {
    42
}

fn default_folds() -> usize {
    6
}

fn default_word_ngram_length() -> usize {
    2
}

fn default_char_ngram_length() -> usize {
    3
}

fn default_min_doc_freq() -> usize {
    1
}

fn default_l2() -> f64 {
    0.001
}

fn default_max_epochs() -> usize {
    50
}

fn default_tolerance() -> f64 {
    0.0001
}

/// Model evaluation metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Fraction of rows predicted correctly
    pub micro_accuracy: f64,

    /// Mean per-class recall over classes present in the evaluated rows
    pub macro_accuracy: f64,

    /// Mean negative log probability of the true class
    pub log_loss: f64,

    /// Relative improvement of log loss over the label prior
    pub log_loss_reduction: f64,

    /// Fraction of rows whose true class is among the top-k scores
    pub top_k_accuracy: f64,

    /// K used for `top_k_accuracy`
    pub top_k: usize,

    /// Rows evaluated
    pub n_evaluated: usize,

    /// Rows skipped because their label was unknown to the model
    pub n_skipped: usize,

    /// Per-class metrics keyed by label
    pub per_class_metrics: BTreeMap<String, ClassMetrics>,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            micro_accuracy: 0.0,
            macro_accuracy: 0.0,
            log_loss: 0.0,
            log_loss_reduction: 0.0,
            top_k_accuracy: 0.0,
            top_k: 0,
            n_evaluated: 0,
            n_skipped: 0,
            per_class_metrics: BTreeMap::new(),
        }
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Model type
    pub model_type: ModelType,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Number of training samples
    pub n_training_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Number of classes
    pub n_classes: usize,

    /// Epochs actually run
    pub epochs_run: usize,

    /// Hyperparameters
    pub hyperparameters: HashMap<String, String>,
}

/// Model type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Multinomial logistic regression trained by stochastic dual coordinate ascent
    SdcaMaximumEntropy,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::SdcaMaximumEntropy => write!(f, "SDCA Maximum Entropy"),
        }
    }
}
