use thiserror::Error;

#[derive(Error, Debug)]
pub enum BriefQaError {
    #[error("Brief extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("No line items in platform snapshot; nothing to reconcile")]
    EmptySnapshot,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BriefQaError>;
