use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Source document not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Record does not fit the fitted transform: {0}")]
    SchemaMismatch(String),

    #[error("Incompatible artifact: {0}")]
    IncompatibleArtifact(String),

    #[error("Vector store error: {0}")]
    Storage(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
