use crate::config::RetrainPolicy;
use crate::error::{AppError, Result};
use crate::ml::classifier::Classifier;
use crate::ml::evaluation::{cross_validate, CrossValidationReport};
use crate::ml::models::{ModelMetadata, TrainingConfig};
use crate::ml::pipeline::{build_training_pipeline, columns, DataView, FittedPipeline};
use crate::ml::store::{ModelStore, FORMAT_VERSION};
use crate::models::TrainingInput;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Fitted pipeline plus everything needed to decide whether it is stale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Hash of the training inputs and settings the model was built from
    pub fingerprint: String,

    pub metadata: ModelMetadata,

    /// Present when there were enough rows to cross-validate
    pub cross_validation: Option<CrossValidationReport>,

    pub pipeline: FittedPipeline,
}

/// Produces a [`TrainedModel`] from training rows
pub trait ModelTrainer {
    fn train(&self, inputs: &[TrainingInput]) -> Result<TrainedModel>;

    /// Cache key for a model trained on `inputs` with this trainer's settings
    fn fingerprint(&self, inputs: &[TrainingInput]) -> Result<String>;
}

/// Cross-validates the training chain, then fits it on every row
#[derive(Debug, Clone)]
pub struct PipelineTrainer {
    config: TrainingConfig,
    top_k: usize,
}

impl PipelineTrainer {
    pub fn new(config: TrainingConfig, top_k: usize) -> Self {
        Self { config, top_k }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    fn metadata(&self, pipeline: &FittedPipeline, n_samples: usize) -> Result<ModelMetadata> {
        let classifier = pipeline
            .classifier()
            .ok_or_else(|| AppError::Training("Pipeline has no classifier".to_string()))?;

        let trainer = &self.config.trainer;
        let mut hyperparameters = HashMap::new();
        hyperparameters.insert(
            "l2_regularization".to_string(),
            trainer.l2_regularization.to_string(),
        );
        hyperparameters.insert("max_epochs".to_string(), trainer.max_epochs.to_string());
        hyperparameters.insert(
            "convergence_tolerance".to_string(),
            trainer.convergence_tolerance.to_string(),
        );
        hyperparameters.insert("seed".to_string(), self.config.seed.to_string());

        Ok(ModelMetadata {
            name: "fixer_classifier".to_string(),
            model_type: classifier.model_type(),
            trained_at: chrono::Utc::now(),
            n_training_samples: n_samples,
            n_features: classifier.n_features().unwrap_or(0),
            n_classes: classifier.n_classes().unwrap_or(0),
            epochs_run: classifier.epochs_run(),
            hyperparameters,
        })
    }
}

impl ModelTrainer for PipelineTrainer {
    fn train(&self, inputs: &[TrainingInput]) -> Result<TrainedModel> {
        if inputs.is_empty() {
            return Err(AppError::Training("No training rows".to_string()));
        }

        info!(rows = inputs.len(), "Training fixer classifier");
        let data = DataView::from_training_inputs(inputs);
        let chain = build_training_pipeline(&self.config);

        let report = cross_validate(
            &chain,
            &data,
            columns::FIXER,
            self.config.cross_validation_folds,
            self.config.seed,
            self.top_k,
        )?;
        if let Some(report) = &report {
            report.log();
        }

        let pipeline = chain.fit(&data)?;
        let metadata = self.metadata(&pipeline, inputs.len())?;
        info!(
            classes = metadata.n_classes,
            features = metadata.n_features,
            epochs = metadata.epochs_run,
            "Training complete"
        );

        Ok(TrainedModel {
            fingerprint: self.fingerprint(inputs)?,
            metadata,
            cross_validation: report,
            pipeline,
        })
    }

    fn fingerprint(&self, inputs: &[TrainingInput]) -> Result<String> {
        fingerprint(inputs, &self.config)
    }
}

/// SHA-256 over every training row and the serialized training settings
pub fn fingerprint(inputs: &[TrainingInput], config: &TrainingConfig) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(FORMAT_VERSION.to_le_bytes());

    for input in inputs {
        for field in [&input.title, &input.description, &input.fixer] {
            // length prefix keeps field boundaries unambiguous
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
    }

    hasher.update(serde_json::to_vec(config)?);

    Ok(format!("{:x}", hasher.finalize()))
}

/// Decides between reusing the stored model and training a new one
#[derive(Debug, Clone)]
pub struct ModelService {
    store: ModelStore,
    policy: RetrainPolicy,
}

impl ModelService {
    pub fn new(store: ModelStore, policy: RetrainPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn policy(&self) -> RetrainPolicy {
        self.policy
    }

    /// Return a model read from disk, training and saving one first if needed
    pub fn load_or_train(
        &self,
        trainer: &dyn ModelTrainer,
        inputs: &[TrainingInput],
    ) -> Result<TrainedModel> {
        if self.store.exists() {
            match self.policy {
                RetrainPolicy::IfMissing => {
                    info!(path = %self.store.path().display(), "Using existing model");
                    return self.store.load();
                }
                RetrainPolicy::OnDataChange => {
                    let existing = self.store.load()?;
                    let current = trainer.fingerprint(inputs)?;
                    if existing.fingerprint == current {
                        info!(path = %self.store.path().display(), "Model is up to date");
                        return Ok(existing);
                    }
                    warn!(
                        stored = %existing.fingerprint,
                        current = %current,
                        "Training data or settings changed, retraining"
                    );
                }
                RetrainPolicy::Always => {
                    debug!("Retrain policy is always, ignoring existing model");
                }
            }
        } else {
            info!(path = %self.store.path().display(), "No model found, training");
        }

        let model = trainer.train(inputs)?;
        self.store.save(&model)?;
        self.store.load()
    }
}
