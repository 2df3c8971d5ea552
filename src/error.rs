use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure taxonomy for every pipeline stage.
///
/// All variants are fatal for the stage that raised them; retries belong to
/// whatever scheduler invoked the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A configured column, key or option does not exist or is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Paired partitions or columns disagree on their length.
    #[error("data shape error: expected {expected}, got {actual}")]
    DataShape { expected: String, actual: String },

    #[error("numeric degeneracy: feature '{feature}' is constant in the training split")]
    NumericDegeneracy { feature: String },

    #[error("failed to fit model '{model}': {reason}")]
    ModelFit { model: String, reason: String },

    /// Malformed input values (unparsable numbers, duplicate keys, ...).
    #[error("data error: {0}")]
    Data(String),

    #[error("artifact '{0}' not found in store")]
    MissingArtifact(String),

    #[error("artifact '{name}' has kind {actual}, expected {expected}")]
    Artifact {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("artifact store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        PipelineError::DataShape {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn model_fit(model: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::ModelFit {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

impl From<sled::Error> for PipelineError {
    fn from(err: sled::Error) -> Self {
        PipelineError::Store(err.to_string())
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Configuration(err.to_string())
    }
}

impl From<polars::prelude::PolarsError> for PipelineError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        PipelineError::Data(format!("csv: {}", err))
    }
}
