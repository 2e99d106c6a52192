use crate::error::{AppError, Result};
use crate::ml::models::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};
use validator::Validate;

/// Environment variable naming an extra configuration file
pub const CONFIG_PATH_ENV: &str = "FIXER_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Issue data source
    #[serde(default)]
    #[validate(nested)]
    pub data: DataConfig,

    /// Model artifact location and reuse policy
    #[serde(default)]
    pub model: ModelConfig,

    /// Featurization, trainer and cross-validation settings
    #[serde(default)]
    #[validate(nested)]
    pub training: TrainingConfig,

    /// Interactive prediction settings
    #[serde(default)]
    #[validate(nested)]
    pub prediction: PredictionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from embedded defaults, an optional file and environment.
    ///
    /// An explicitly named file must exist.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ));

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            // Override with environment variables (prefix: FIXER__)
            .add_source(
                config::Environment::with_prefix("FIXER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.check()?;
        Ok(config)
    }

    /// Run field validation plus the checks validator cannot express
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        self.data.delimiter_byte()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DataConfig {
    /// Issue CSV path
    #[serde(default = "default_issues_path")]
    pub issues_path: PathBuf,

    /// Single ASCII field delimiter
    #[serde(default = "default_delimiter")]
    #[validate(length(min = 1))]
    pub delimiter: String,
}

impl DataConfig {
    pub fn delimiter_byte(&self) -> Result<u8> {
        let mut chars = self.delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii() => Ok(c as u8),
            _ => Err(AppError::Configuration(format!(
                "data.delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            ))),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            issues_path: default_issues_path(),
            delimiter: default_delimiter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model artifact path
    #[serde(default = "default_model_path")]
    pub path: PathBuf,

    /// When to retrain instead of reusing the stored model
    #[serde(default)]
    pub retrain_policy: RetrainPolicy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            retrain_policy: RetrainPolicy::default(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RetrainPolicy {
    /// Train only when no model file exists
    #[default]
    IfMissing,
    /// Retrain when the training data or settings fingerprint changes
    OnDataChange,
    /// Retrain on every start
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PredictionConfig {
    /// Predictions printed per query
    #[serde(default = "default_top_k")]
    #[validate(range(min = 1))]
    pub top_k: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level, used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_issues_path() -> PathBuf {
    PathBuf::from("issues.csv")
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_model_path() -> PathBuf {
    PathBuf::from("dd.ml")
}

fn default_top_k() -> usize {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}
