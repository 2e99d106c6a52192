/// Machine learning for fixer prediction
///
/// This module provides:
/// - Text featurization of issue titles and descriptions
/// - A label key dictionary for fixer names
/// - An SDCA maximum-entropy classifier
/// - Estimator chains that are fit once and replayed at prediction time
/// - K-fold cross-validation
/// - A binary model store and a retrain-aware model cache

pub mod classifier;
pub mod evaluation;
pub mod features;
pub mod labels;
pub mod models;
pub mod pipeline;
pub mod service;
pub mod store;

pub use classifier::{Classifier, SdcaMaximumEntropy};
pub use evaluation::{cross_validate, CrossValidationReport, MetricSummary};
pub use features::{TextFeaturizer, TextPreprocessor};
pub use labels::LabelDictionary;
pub use models::{
    ClassMetrics, FeatureConfig, ModelMetadata, ModelMetrics, ModelType, TrainerConfig,
    TrainingConfig,
};
pub use pipeline::{
    build_data_pipeline, build_training_pipeline, DataView, EstimatorChain, FittedPipeline,
};
pub use service::{fingerprint, ModelService, ModelTrainer, PipelineTrainer, TrainedModel};
pub use store::ModelStore;
