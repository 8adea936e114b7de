//! Error types for the insight pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, InsightError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum InsightError {
    /// Record fields do not line up with the schema a model was fitted on
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Uploaded tabular input is malformed or lacks required columns
    #[error("Input parse error: {0}")]
    InputParse(String),

    /// Model artifact is missing or corrupt
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Reference or training dataset could not be obtained
    #[error("Data fetch error: {0}")]
    DataFetch(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Explanation error: {0}")]
    Explanation(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },
}

impl InsightError {
    /// Whether the user can fix this by supplying different input
    pub fn is_input_error(&self) -> bool {
        matches!(self, InsightError::SchemaMismatch(_) | InsightError::InputParse(_))
    }

    /// Message shown to the dashboard user
    pub fn user_message(&self) -> String {
        match self {
            InsightError::SchemaMismatch(msg) => {
                format!("The input does not match the model's features: {}", msg)
            }
            InsightError::InputParse(msg) => {
                format!("The uploaded file could not be used: {}", msg)
            }
            InsightError::ModelLoad(msg) => format!("The model could not be loaded: {}", msg),
            InsightError::DataFetch(msg) => format!("The dataset is unavailable: {}", msg),
            other => other.to_string(),
        }
    }
}

impl From<polars::error::PolarsError> for InsightError {
    fn from(err: polars::error::PolarsError) -> Self {
        InsightError::InputParse(err.to_string())
    }
}

impl From<serde_json::Error> for InsightError {
    fn from(err: serde_json::Error) -> Self {
        InsightError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for InsightError {
    fn from(err: bincode::Error) -> Self {
        InsightError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for InsightError {
    fn from(err: ndarray::ShapeError) -> Self {
        InsightError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
