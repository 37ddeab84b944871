//! Fraud detection error types
//!
//! None of these reach the monitor loop: feature failures degrade to safe
//! defaults and classification failures degrade to the reduced rule set.

use thiserror::Error;

/// Fraud detection error type
#[derive(Debug, Error)]
pub enum DetectionError {
    /// The pretrained artifact could not be read or parsed
    #[error("Artifact load failed: {0}")]
    ArtifactLoad(String),

    /// Wallet history could not be aggregated
    #[error("Feature computation failed: {0}")]
    FeatureComputation(String),

    /// Transaction history query failed
    #[error("History query failed: {0}")]
    History(String),

    /// Preprocessor rejected the aligned feature row
    #[error("Preprocessing failed: {0}")]
    Preprocessing(String),

    /// Model could not produce a probability
    #[error("Model inference failed: {0}")]
    ModelInference(String),

    /// Input vector has the wrong shape or non-finite values
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fraud detection result type
pub type Result<T> = std::result::Result<T, DetectionError>;
