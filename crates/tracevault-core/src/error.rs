use thiserror::Error;

use crate::types::AnalysisStatus;

/// Top-level error type for the TraceVault system.
///
/// Each variant covers one subsystem or one contract failure from the
/// collaborator seams. Subsystem crates return this type directly so the
/// `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TraceVaultError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metadata, OCR, or frame-extraction collaborator failure.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Face-detection collaborator failure.
    #[error("Detection error: {0}")]
    Detection(String),

    /// Scene-classification collaborator failure.
    #[error("Classification error: {0}")]
    Classification(String),

    /// Malformed, mis-sized, or zero-norm embedding vector.
    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    /// A fan-out target has no Frame row. Signals a collaborator contract
    /// violation, not a normal runtime condition.
    #[error("Frame not found for target: {0}")]
    FrameNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AnalysisStatus,
        to: AnalysisStatus,
    },

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for TraceVaultError {
    fn from(err: toml::de::Error) -> Self {
        TraceVaultError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TraceVaultError {
    fn from(err: toml::ser::Error) -> Self {
        TraceVaultError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for TraceVaultError {
    fn from(err: serde_json::Error) -> Self {
        TraceVaultError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for TraceVault operations.
pub type Result<T> = std::result::Result<T, TraceVaultError>;
