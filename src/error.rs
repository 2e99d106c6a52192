use std::path::PathBuf;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Issue CSV does not exist
    #[error("Input file not found: {}", .0.display())]
    InputFileMissing(PathBuf),

    /// Issue CSV does not match the expected schema
    #[error("Parse error at line {line}: {message}")]
    Parse { line: u64, message: String },

    /// Model artifact does not exist
    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    /// Model artifact exists but cannot be used by this pipeline
    #[error("Model file {} is corrupt: {reason}", .path.display())]
    ModelFileCorrupt { path: PathBuf, reason: String },

    /// Inference failed for a single query
    #[error("Inference error: {0}")]
    Inference(String),

    /// Training could not produce a model
    #[error("Training error: {0}")]
    Training(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Configuration(_) | AppError::Validation(_) => 2,
            AppError::InputFileMissing(_) => 3,
            AppError::Parse { .. } => 4,
            AppError::ModelNotFound(_) | AppError::ModelFileCorrupt { .. } => 5,
            AppError::Io(_) => 6,
            AppError::Inference(_)
            | AppError::Training(_)
            | AppError::Serialization(_)
            | AppError::Internal(_) => 1,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::InputFileMissing(_) => "INPUT_FILE_MISSING",
            AppError::Parse { .. } => "PARSE_ERROR",
            AppError::ModelNotFound(_) => "MODEL_NOT_FOUND",
            AppError::ModelFileCorrupt { .. } => "MODEL_FILE_CORRUPT",
            AppError::Inference(_) => "INFERENCE_ERROR",
            AppError::Training(_) => "TRAINING_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Conversion from csv::Error
impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|pos| pos.line()).unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(io) => AppError::Io(io),
            csv::ErrorKind::Deserialize { err, .. } => AppError::Parse {
                line,
                message: err.to_string(),
            },
            csv::ErrorKind::UnequalLengths {
                expected_len, len, ..
            } => AppError::Parse {
                line,
                message: format!("expected {} fields, found {}", expected_len, len),
            },
            csv::ErrorKind::Utf8 { err, .. } => AppError::Parse {
                line,
                message: err.to_string(),
            },
            other => AppError::Parse {
                line,
                message: format!("{:?}", other),
            },
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from bincode::Error
impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            AppError::InputFileMissing(PathBuf::from("issues.csv")).exit_code(),
            3
        );
        assert_eq!(
            AppError::Parse {
                line: 2,
                message: "bad".to_string()
            }
            .exit_code(),
            4
        );
        assert_eq!(
            AppError::ModelFileCorrupt {
                path: PathBuf::from("dd.ml"),
                reason: "bad magic".to_string()
            }
            .exit_code(),
            5
        );
        assert_eq!(AppError::Configuration("x".to_string()).exit_code(), 2);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::ModelNotFound(PathBuf::from("dd.ml")).error_code(),
            "MODEL_NOT_FOUND"
        );
        assert_eq!(
            AppError::Inference("test".to_string()).error_code(),
            "INFERENCE_ERROR"
        );
    }

    #[test]
    fn test_csv_field_count_maps_to_parse_error() {
        let data = "Title,Description\nonly-one-field\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let err = reader
            .records()
            .next()
            .expect("one row")
            .expect_err("unequal lengths");

        match AppError::from(err) {
            AppError::Parse { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("expected 2 fields"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
