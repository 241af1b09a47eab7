//! Error type shared by every pipeline stage.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A source could not be fetched, or did not parse as the expected table.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// A stage needed more records than the input provides.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("model error: {0}")]
    Model(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
