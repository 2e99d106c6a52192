//! Fixer predictor
//!
//! Trains a text classifier on past support issues and suggests who should
//! fix a new one. Issues are read from CSV, featurized, and used to fit an
//! SDCA maximum-entropy model whose quality is estimated with k-fold
//! cross-validation. The fitted pipeline is persisted so later runs can skip
//! training, and an interactive console loop prints the most likely fixers
//! for each issue typed in.

pub mod app;
pub mod config;
pub mod error;
pub mod loader;
pub mod ml;
pub mod models;
pub mod predictor;

pub use config::{Config, RetrainPolicy};
pub use error::{AppError, Result};
pub use models::{Issue, IssuePrediction, IssueQuery, LabelScore, TrainingInput};
pub use predictor::{IssuePredictor, PredictionEngine};
