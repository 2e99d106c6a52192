//! Startup flow: load issues, obtain a model, then serve the console loop.

use crate::config::Config;
use crate::error::Result;
use crate::loader::load_issues;
use crate::ml::service::{ModelService, PipelineTrainer, TrainedModel};
use crate::ml::store::ModelStore;
use crate::models::TrainingInput;
use crate::predictor::{InteractiveSession, PredictionEngine, SessionStats};
use std::io::{BufRead, Write};
use tracing::info;

/// Load the issue file and return a model read back from the model path
pub fn prepare_model(config: &Config) -> Result<TrainedModel> {
    let issues = load_issues(&config.data.issues_path, config.data.delimiter_byte()?)?;
    let inputs: Vec<TrainingInput> = issues.into_iter().map(TrainingInput::from).collect();

    let trainer = PipelineTrainer::new(config.training.clone(), config.prediction.top_k);
    let service = ModelService::new(
        ModelStore::new(&config.model.path),
        config.model.retrain_policy,
    );
    service.load_or_train(&trainer, &inputs)
}

/// Prepare the model and run the interactive session over `input`/`output`
pub fn run<R: BufRead, W: Write>(config: &Config, input: R, output: W) -> Result<SessionStats> {
    let model = prepare_model(config)?;
    info!(
        classes = model.metadata.n_classes,
        trained_at = %model.metadata.trained_at,
        "Model ready"
    );

    let engine = PredictionEngine::new(model);
    InteractiveSession::new(&engine, input, output, config.prediction.top_k).run()
}
