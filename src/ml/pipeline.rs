//! Declarative estimator chain over named columns
//!
//! An [`EstimatorChain`] is a list of step descriptions and does no work
//! until [`EstimatorChain::fit`] is called. Fitting walks the steps in order,
//! fitting each one on the view produced by the previous fitted steps, and
//! returns a [`FittedPipeline`] that replays the same transforms at
//! prediction time.

use crate::error::{AppError, Result};
use crate::ml::classifier::{Classifier, SdcaMaximumEntropy};
use crate::ml::features::TextFeaturizer;
use crate::ml::labels::LabelDictionary;
use crate::ml::models::{FeatureConfig, TrainerConfig, TrainingConfig};
use crate::models::{IssueQuery, TrainingInput};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Well-known column names
pub mod columns {
    pub const TITLE: &str = "Title";
    pub const DESCRIPTION: &str = "Description";
    pub const FIXER: &str = "Fixer";
    pub const LABEL: &str = "Label";
    pub const TITLE_FEATURIZED: &str = "TitleFeaturized";
    pub const DESCRIPTION_FEATURIZED: &str = "DescriptionFeaturized";
    pub const FEATURES: &str = "Features";
    pub const SCORE: &str = "Score";
    pub const PREDICTED_LABEL: &str = "PredictedLabel";
}

/// A single column of a [`DataView`]
#[derive(Debug, Clone)]
pub enum Column {
    /// Raw text
    Text(Vec<String>),

    /// Categorical keys, `None` for values the dictionary has never seen
    Key {
        values: Vec<Option<usize>>,
        dictionary: LabelDictionary,
    },

    /// Dense numeric vectors, one row per record
    Vector {
        values: Array2<f64>,
        slot_names: Option<Vec<String>>,
    },
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Text(values) => values.len(),
            Column::Key { values, .. } => values.len(),
            Column::Vector { values, .. } => values.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select_rows(&self, rows: &[usize]) -> Column {
        match self {
            Column::Text(values) => Column::Text(rows.iter().map(|&r| values[r].clone()).collect()),
            Column::Key { values, dictionary } => Column::Key {
                values: rows.iter().map(|&r| values[r]).collect(),
                dictionary: dictionary.clone(),
            },
            Column::Vector { values, slot_names } => Column::Vector {
                values: values.select(Axis(0), rows),
                slot_names: slot_names.clone(),
            },
        }
    }
}

/// Column-oriented table flowing through the pipeline
#[derive(Debug, Clone, Default)]
pub struct DataView {
    n_rows: usize,
    columns: BTreeMap<String, Column>,
}

impl DataView {
    /// Title, Description and Fixer columns from training rows
    pub fn from_training_inputs(inputs: &[TrainingInput]) -> Self {
        let mut view = Self {
            n_rows: inputs.len(),
            columns: BTreeMap::new(),
        };
        view.columns.insert(
            columns::TITLE.to_string(),
            Column::Text(inputs.iter().map(|i| i.title.clone()).collect()),
        );
        view.columns.insert(
            columns::DESCRIPTION.to_string(),
            Column::Text(inputs.iter().map(|i| i.description.clone()).collect()),
        );
        view.columns.insert(
            columns::FIXER.to_string(),
            Column::Text(inputs.iter().map(|i| i.fixer.clone()).collect()),
        );
        view
    }

    /// Single-row view for a prediction query; it has no Fixer column
    pub fn from_query(query: &IssueQuery) -> Self {
        let mut view = Self {
            n_rows: 1,
            columns: BTreeMap::new(),
        };
        view.columns.insert(
            columns::TITLE.to_string(),
            Column::Text(vec![query.title.clone()]),
        );
        view.columns.insert(
            columns::DESCRIPTION.to_string(),
            Column::Text(vec![query.description.clone()]),
        );
        view
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .get(name)
            .ok_or_else(|| AppError::Internal(format!("Column '{}' not found", name)))
    }

    pub fn text(&self, name: &str) -> Result<&[String]> {
        match self.column(name)? {
            Column::Text(values) => Ok(values),
            _ => Err(AppError::Internal(format!("Column '{}' is not text", name))),
        }
    }

    pub fn keys(&self, name: &str) -> Result<(&[Option<usize>], &LabelDictionary)> {
        match self.column(name)? {
            Column::Key { values, dictionary } => Ok((values, dictionary)),
            _ => Err(AppError::Internal(format!("Column '{}' is not a key column", name))),
        }
    }

    pub fn vector(&self, name: &str) -> Result<(&Array2<f64>, Option<&[String]>)> {
        match self.column(name)? {
            Column::Vector { values, slot_names } => Ok((values, slot_names.as_deref())),
            _ => Err(AppError::Internal(format!("Column '{}' is not a vector", name))),
        }
    }

    /// Add or replace a column
    pub fn set_column(&mut self, name: &str, column: Column) -> Result<()> {
        if column.len() != self.n_rows {
            return Err(AppError::Internal(format!(
                "Column '{}' has {} rows, view has {}",
                name,
                column.len(),
                self.n_rows
            )));
        }
        self.columns.insert(name.to_string(), column);
        Ok(())
    }

    /// Copy of the given rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            n_rows: rows.len(),
            columns: self
                .columns
                .iter()
                .map(|(name, column)| (name.clone(), column.select_rows(rows)))
                .collect(),
        }
    }
}

/// Unfitted step description
#[derive(Debug, Clone)]
pub enum EstimatorStep {
    MapValueToKey {
        output: String,
        input: String,
    },
    FeaturizeText {
        output: String,
        input: String,
        config: FeatureConfig,
    },
    Concatenate {
        output: String,
        inputs: Vec<String>,
    },
    CacheCheckpoint,
    SdcaMaximumEntropy {
        label: String,
        features: String,
        config: TrainerConfig,
        seed: u64,
    },
    MapKeyToValue {
        output: String,
        input: String,
    },
}

impl EstimatorStep {
    fn fit(&self, view: &DataView) -> Result<FittedStep> {
        let fitted = match self {
            EstimatorStep::MapValueToKey { output, input } => {
                let values = view.text(input)?;
                FittedStep::ValueToKey {
                    output: output.clone(),
                    input: input.clone(),
                    dictionary: LabelDictionary::fit(values.iter().map(String::as_str)),
                }
            }
            EstimatorStep::FeaturizeText {
                output,
                input,
                config,
            } => {
                let mut featurizer = TextFeaturizer::new(config.clone());
                featurizer.fit(view.text(input)?)?;
                debug!(
                    column = %input,
                    vocab_size = featurizer.vocab_size(),
                    "Fitted text featurizer"
                );
                FittedStep::Text {
                    output: output.clone(),
                    input: input.clone(),
                    featurizer,
                }
            }
            EstimatorStep::Concatenate { output, inputs } => FittedStep::Concatenate {
                output: output.clone(),
                inputs: inputs.clone(),
            },
            EstimatorStep::CacheCheckpoint => FittedStep::Checkpoint,
            EstimatorStep::SdcaMaximumEntropy {
                label,
                features,
                config,
                seed,
            } => {
                let (keys, dictionary) = view.keys(label)?;
                let labels: Vec<usize> = keys
                    .iter()
                    .enumerate()
                    .map(|(row, key)| {
                        key.ok_or_else(|| {
                            AppError::Training(format!("Row {} has no label key", row))
                        })
                    })
                    .collect::<Result<_>>()?;
                let (x, _) = view.vector(features)?;

                let mut model = SdcaMaximumEntropy::new(config.clone(), *seed);
                model.fit(x, &labels, dictionary.len())?;
                debug!(
                    rows = x.nrows(),
                    features = x.ncols(),
                    classes = dictionary.len(),
                    epochs = model.epochs_run(),
                    "Fitted SDCA maximum entropy"
                );

                FittedStep::Classifier {
                    features: features.clone(),
                    dictionary: dictionary.clone(),
                    model,
                }
            }
            EstimatorStep::MapKeyToValue { output, input } => FittedStep::KeyToValue {
                output: output.clone(),
                input: input.clone(),
            },
        };
        Ok(fitted)
    }
}

/// Chain of estimator steps
#[derive(Debug, Clone, Default)]
pub struct EstimatorChain {
    steps: Vec<EstimatorStep>,
}

impl EstimatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(mut self, step: EstimatorStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn map_value_to_key(self, output: &str, input: &str) -> Self {
        self.append(EstimatorStep::MapValueToKey {
            output: output.to_string(),
            input: input.to_string(),
        })
    }

    pub fn featurize_text(self, output: &str, input: &str, config: FeatureConfig) -> Self {
        self.append(EstimatorStep::FeaturizeText {
            output: output.to_string(),
            input: input.to_string(),
            config,
        })
    }

    pub fn concatenate(self, output: &str, inputs: &[&str]) -> Self {
        self.append(EstimatorStep::Concatenate {
            output: output.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn append_cache_checkpoint(self) -> Self {
        self.append(EstimatorStep::CacheCheckpoint)
    }

    pub fn append_trainer(
        self,
        label: &str,
        features: &str,
        config: TrainerConfig,
        seed: u64,
    ) -> Self {
        self.append(EstimatorStep::SdcaMaximumEntropy {
            label: label.to_string(),
            features: features.to_string(),
            config,
            seed,
        })
    }

    pub fn map_key_to_value(self, output: &str, input: &str) -> Self {
        self.append(EstimatorStep::MapKeyToValue {
            output: output.to_string(),
            input: input.to_string(),
        })
    }

    pub fn steps(&self) -> &[EstimatorStep] {
        &self.steps
    }

    /// Fit every step in order
    pub fn fit(&self, data: &DataView) -> Result<FittedPipeline> {
        let mut view = data.clone();
        let mut fitted_steps = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let fitted = step.fit(&view)?;
            view = fitted.transform(view)?;
            fitted_steps.push(fitted);
        }

        Ok(FittedPipeline {
            steps: fitted_steps,
        })
    }
}

/// Fitted step, serialized into the model artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FittedStep {
    ValueToKey {
        output: String,
        input: String,
        dictionary: LabelDictionary,
    },
    Text {
        output: String,
        input: String,
        featurizer: TextFeaturizer,
    },
    Concatenate {
        output: String,
        inputs: Vec<String>,
    },
    Checkpoint,
    Classifier {
        features: String,
        dictionary: LabelDictionary,
        model: SdcaMaximumEntropy,
    },
    KeyToValue {
        output: String,
        input: String,
    },
}

impl FittedStep {
    fn transform(&self, mut view: DataView) -> Result<DataView> {
        match self {
            FittedStep::ValueToKey {
                output,
                input,
                dictionary,
            } => {
                // Prediction views carry no label column
                if !view.has_column(input) {
                    return Ok(view);
                }
                let values = view
                    .text(input)?
                    .iter()
                    .map(|label| dictionary.key_of(label))
                    .collect();
                view.set_column(
                    output,
                    Column::Key {
                        values,
                        dictionary: dictionary.clone(),
                    },
                )?;
            }
            FittedStep::Text {
                output,
                input,
                featurizer,
            } => {
                let values = featurizer.transform_batch(view.text(input)?)?;
                view.set_column(
                    output,
                    Column::Vector {
                        values,
                        slot_names: None,
                    },
                )?;
            }
            FittedStep::Concatenate { output, inputs } => {
                let parts: Vec<ArrayView2<f64>> = inputs
                    .iter()
                    .map(|name| view.vector(name).map(|(values, _)| values.view()))
                    .collect::<Result<_>>()?;
                let values = ndarray::concatenate(Axis(1), &parts).map_err(|e| {
                    AppError::Internal(format!("Cannot concatenate {:?}: {}", inputs, e))
                })?;
                view.set_column(
                    output,
                    Column::Vector {
                        values,
                        slot_names: None,
                    },
                )?;
            }
            FittedStep::Checkpoint => {
                for column in view.columns.values_mut() {
                    if let Column::Vector { values, .. } = column {
                        if !values.is_standard_layout() {
                            *values = values.as_standard_layout().into_owned();
                        }
                    }
                }
                debug!(rows = view.n_rows(), "Cache checkpoint materialized");
            }
            FittedStep::Classifier {
                features,
                dictionary,
                model,
            } => {
                let (x, _) = view.vector(features)?;
                let scores = model.predict_proba(x)?;
                let predicted = model.predict(x)?;
                view.set_column(
                    columns::SCORE,
                    Column::Vector {
                        values: scores,
                        slot_names: Some(dictionary.labels().to_vec()),
                    },
                )?;
                view.set_column(
                    columns::PREDICTED_LABEL,
                    Column::Key {
                        values: predicted.into_iter().map(Some).collect(),
                        dictionary: dictionary.clone(),
                    },
                )?;
            }
            FittedStep::KeyToValue { output, input } => {
                let (keys, dictionary) = view.keys(input)?;
                let values = keys
                    .iter()
                    .map(|key| {
                        key.and_then(|k| dictionary.label(k))
                            .unwrap_or_default()
                            .to_string()
                    })
                    .collect();
                view.set_column(output, Column::Text(values))?;
            }
        }
        Ok(view)
    }
}

/// Fitted chain of transforms ending in the classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedPipeline {
    steps: Vec<FittedStep>,
}

impl FittedPipeline {
    /// Run every fitted step over the view
    pub fn transform(&self, data: DataView) -> Result<DataView> {
        self.steps
            .iter()
            .try_fold(data, |view, step| step.transform(view))
    }

    pub fn steps(&self) -> &[FittedStep] {
        &self.steps
    }

    /// Label dictionary the classifier scores against
    pub fn label_dictionary(&self) -> Option<&LabelDictionary> {
        self.steps.iter().find_map(|step| match step {
            FittedStep::Classifier { dictionary, .. } => Some(dictionary),
            _ => None,
        })
    }

    pub fn classifier(&self) -> Option<&SdcaMaximumEntropy> {
        self.steps.iter().find_map(|step| match step {
            FittedStep::Classifier { model, .. } => Some(model),
            _ => None,
        })
    }

    /// Check that fitted shapes line up from featurizers to classifier
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut dims: HashMap<&str, usize> = HashMap::new();
        let mut has_classifier = false;

        for step in &self.steps {
            match step {
                FittedStep::ValueToKey { dictionary, .. } => {
                    if !dictionary.is_consistent() {
                        return Err("label dictionary is not a bijection".to_string());
                    }
                }
                FittedStep::Text {
                    output, featurizer, ..
                } => {
                    if !featurizer.is_fitted() || !featurizer.is_consistent() {
                        return Err(format!("featurizer for '{}' is inconsistent", output));
                    }
                    dims.insert(output, featurizer.dim());
                }
                FittedStep::Concatenate { output, inputs } => {
                    let mut total = 0;
                    for input in inputs {
                        total += dims
                            .get(input.as_str())
                            .ok_or_else(|| format!("'{}' is not produced by a featurizer", input))?;
                    }
                    dims.insert(output, total);
                }
                FittedStep::Checkpoint | FittedStep::KeyToValue { .. } => {}
                FittedStep::Classifier {
                    features,
                    dictionary,
                    model,
                } => {
                    has_classifier = true;
                    let expected = dims
                        .get(features.as_str())
                        .ok_or_else(|| format!("'{}' is not produced by any step", features))?;
                    if model.n_features() != Some(*expected) {
                        return Err(format!(
                            "classifier expects {:?} features, pipeline produces {}",
                            model.n_features(),
                            expected
                        ));
                    }
                    if model.n_classes() != Some(dictionary.len()) || !dictionary.is_consistent() {
                        return Err("classifier classes do not match label dictionary".to_string());
                    }
                }
            }
        }

        if has_classifier {
            Ok(())
        } else {
            Err("pipeline has no trained classifier".to_string())
        }
    }
}

/// Label keying, per-field text featurization, concatenation and checkpoint
pub fn build_data_pipeline(features: &FeatureConfig) -> EstimatorChain {
    EstimatorChain::new()
        .map_value_to_key(columns::LABEL, columns::FIXER)
        .featurize_text(columns::TITLE_FEATURIZED, columns::TITLE, features.clone())
        .featurize_text(
            columns::DESCRIPTION_FEATURIZED,
            columns::DESCRIPTION,
            features.clone(),
        )
        .concatenate(
            columns::FEATURES,
            &[columns::TITLE_FEATURIZED, columns::DESCRIPTION_FEATURIZED],
        )
        .append_cache_checkpoint()
}

/// Data pipeline followed by the classifier and the key-to-label mapping
pub fn build_training_pipeline(config: &TrainingConfig) -> EstimatorChain {
    build_data_pipeline(&config.features)
        .append_trainer(
            columns::LABEL,
            columns::FEATURES,
            config.trainer.clone(),
            config.seed,
        )
        .map_key_to_value(columns::PREDICTED_LABEL, columns::PREDICTED_LABEL)
}
