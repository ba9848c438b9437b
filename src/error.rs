//! Error types for the jobpower pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for jobpower operations
pub type Result<T> = std::result::Result<T, JobPowerError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum JobPowerError {
    #[error("Data access error: {0}")]
    DataAccess(String),

    #[error("Invalid power sequence for job {job_id}: {reason}")]
    InvalidSequence { job_id: i64, reason: String },

    #[error("Division by zero: job {job_id} has no allocated nodes")]
    DivisionByZero { job_id: i64 },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    ModelFit(#[from] ModelFitError),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Stage of the fit/predict cycle where a model failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStage {
    Fit,
    Predict,
}

impl fmt::Display for FitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitStage::Fit => write!(f, "fit"),
            FitStage::Predict => write!(f, "predict"),
        }
    }
}

/// Failure of one estimator inside the evaluation harness.
///
/// Recorded in the report row of the model that produced it; never aborts
/// the remaining models.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("model '{model}' failed during {stage}: {reason}")]
pub struct ModelFitError {
    pub model: String,
    pub stage: FitStage,
    pub reason: String,
}

impl ModelFitError {
    pub fn new(model: impl Into<String>, stage: FitStage, reason: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            stage,
            reason: reason.into(),
        }
    }
}

impl JobPowerError {
    pub(crate) fn shape_mismatch(expected: usize, actual: usize, what: &str) -> Self {
        JobPowerError::Shape {
            expected: format!("{} = {}", what, expected),
            actual: format!("{} = {}", what, actual),
        }
    }
}

impl From<polars::error::PolarsError> for JobPowerError {
    fn from(err: polars::error::PolarsError) -> Self {
        JobPowerError::DataAccess(err.to_string())
    }
}

impl From<serde_json::Error> for JobPowerError {
    fn from(err: serde_json::Error) -> Self {
        JobPowerError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for JobPowerError {
    fn from(err: ndarray::ShapeError) -> Self {
        JobPowerError::Shape {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
