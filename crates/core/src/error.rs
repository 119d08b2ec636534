use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecommendError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("dataset error: {0}")]
    Dataset(String),
    #[error("dataset not found: {0:?}")]
    DatasetMissing(PathBuf),
    #[error("model not ready: recommendations requested before the engine finished loading")]
    ModelNotReady,
    #[error("no ingredients provided")]
    EmptyQuery,
    #[error("top_n must be at least 1")]
    InvalidTopN,
    #[error("model artifact does not match its vocabulary: {0}")]
    ModelMismatch(String),
    #[error("model artifact error: {0}")]
    Artifact(String),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RecommendError>;

impl RecommendError {
    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RecommendError::Io(_) => "io_error",
            RecommendError::Dataset(_) | RecommendError::DatasetMissing(_) => "dataset_error",
            RecommendError::ModelNotReady => "model_not_ready",
            RecommendError::EmptyQuery => "empty_query",
            RecommendError::InvalidTopN => "invalid_top_n",
            RecommendError::ModelMismatch(_) => "model_mismatch",
            RecommendError::Artifact(_) => "artifact_error",
            RecommendError::Config(_) => "config_error",
        }
    }

    /// Errors caused by the caller's input rather than server state.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RecommendError::EmptyQuery | RecommendError::InvalidTopN)
    }
}

impl From<bincode::Error> for RecommendError {
    fn from(value: bincode::Error) -> Self {
        Self::Artifact(value.to_string())
    }
}

impl From<csv::Error> for RecommendError {
    fn from(value: csv::Error) -> Self {
        Self::Dataset(format!("malformed table: {value}"))
    }
}

impl From<toml::de::Error> for RecommendError {
    fn from(value: toml::de::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<serde_json::Error> for RecommendError {
    fn from(value: serde_json::Error) -> Self {
        Self::Artifact(value.to_string())
    }
}
