//! Fixer prediction against a trained model and the console loop around it.

pub mod session;

pub use session::{InteractiveSession, SessionState, SessionStats};

use crate::error::{AppError, Result};
use crate::ml::pipeline::{columns, DataView};
use crate::ml::service::TrainedModel;
use crate::models::{IssuePrediction, IssueQuery};
use tracing::debug;
use validator::Validate;

/// Ranks candidate fixers for a query
pub trait IssuePredictor {
    fn predict(&self, query: &IssueQuery) -> Result<IssuePrediction>;
}

/// Runs queries through a loaded model's fitted pipeline
#[derive(Debug, Clone)]
pub struct PredictionEngine {
    model: TrainedModel,
}

impl PredictionEngine {
    pub fn new(model: TrainedModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }
}

impl IssuePredictor for PredictionEngine {
    fn predict(&self, query: &IssueQuery) -> Result<IssuePrediction> {
        query.validate()?;

        let scored = self.model.pipeline.transform(DataView::from_query(query))?;
        let (scores, slot_names) = scored.vector(columns::SCORE)?;
        let labels = slot_names
            .ok_or_else(|| AppError::Inference("Score column has no slot names".to_string()))?;

        let row = scores.row(0);
        if row.len() != labels.len() {
            return Err(AppError::Inference(format!(
                "{} scores for {} labels",
                row.len(),
                labels.len()
            )));
        }
        let row: Vec<f32> = row.iter().map(|&p| p as f32).collect();

        let predicted_label = scored
            .text(columns::PREDICTED_LABEL)?
            .first()
            .cloned()
            .unwrap_or_default();
        debug!(predicted = %predicted_label, "Scored query");

        Ok(IssuePrediction::ranked(predicted_label, labels, &row))
    }
}
