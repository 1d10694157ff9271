use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file {0} not found")]
    Unavailable(PathBuf),
    #[error("unsupported model format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("feature length mismatch: got {got}, expected {expected}")]
    ShapeMismatch { got: usize, expected: usize },
    #[error("model returned no output")]
    EmptyOutput,
    #[error("model output {0} has no integer prediction")]
    NonFinite(f64),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("field {field} is not a valid number")]
    InvalidNumber { field: &'static str },
    #[error("input rejected by validator")]
    Rejected,
    #[error("division by zero: dew point temperature times hour is zero")]
    DivisionByZero,
    #[error("model not available at {0}")]
    ModelUnavailable(PathBuf),
    #[error("model error: {0}")]
    Model(ModelError),
}

impl From<ModelError> for PredictError {
    fn from(value: ModelError) -> Self {
        match value {
            ModelError::Unavailable(path) => PredictError::ModelUnavailable(path),
            other => PredictError::Model(other),
        }
    }
}

impl PredictError {
    /// Flash message shown to the user. Internal detail stays in the log.
    pub fn user_message(&self) -> &'static str {
        match self {
            PredictError::InvalidNumber { .. } | PredictError::Rejected => {
                "Please enter valid numbers"
            }
            PredictError::DivisionByZero => {
                "Invalid input: dew point temperature and hour must both be non-zero"
            }
            PredictError::ModelUnavailable(_) => "Model not available",
            PredictError::Model(_) => "Prediction failed, please try again",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}
