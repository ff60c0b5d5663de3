//! Error types for structure ingestion and queries

use thiserror::Error;

/// Failure of an ingestion or query call
#[derive(Debug, Error)]
pub enum StructureError {
    /// A requested entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// An ingestion fact refers to state that has not been ingested yet
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Path resolution could not even match its root directory
    #[error("path resolution matched nothing: {0}")]
    ResolutionEmpty(String),

    /// Malformed input, e.g. an empty file path
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Underlying store failure
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type StructureResult<T> = Result<T, StructureError>;
