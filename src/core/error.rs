use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// One image could not be read or decoded.
#[derive(Debug, Error)]
#[error("Failed to decode {id}: {message}")]
pub struct DecodeError {
    pub id: String,
    pub message: String,
}

impl DecodeError {
    pub fn new(id: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self {
            id: id.into(),
            message: err.to_string(),
        }
    }
}

/// The encoder failed on an image that decoded fine.
#[derive(Debug, Error)]
#[error("Encoder failed on {id}: {message}")]
pub struct EncoderInferenceError {
    pub id: String,
    pub message: String,
}

/// Fatal for the whole run; raised before any image is processed.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid similarity threshold {0}: must be a finite, non-negative number")]
    InvalidThreshold(f64),

    #[error("Collection not found or not a directory: {}", .path.display())]
    MissingCollection { path: PathBuf },

    #[error("Could not load encoder weights from {}: {message}", .path.display())]
    EncoderWeights { path: PathBuf, message: String },

    #[error("Feature vectors have mismatched dimensions: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not read configuration {}: {message}", .path.display())]
    Unreadable { path: PathBuf, message: String },
}

/// The report could not be written out.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to serialise report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write report to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A per-image failure recorded during a run. The image is skipped for the
/// stage that failed; the rest of the run carries on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageIssue {
    Decode { id: String, message: String },
    Inference { id: String, message: String },
}

impl ImageIssue {
    pub fn id(&self) -> &str {
        match self {
            ImageIssue::Decode { id, .. } | ImageIssue::Inference { id, .. } => id,
        }
    }
}

impl std::fmt::Display for ImageIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageIssue::Decode { id, message } => write!(f, "{id}: could not decode ({message})"),
            ImageIssue::Inference { id, message } => {
                write!(f, "{id}: no feature vector ({message})")
            }
        }
    }
}

impl From<DecodeError> for ImageIssue {
    fn from(err: DecodeError) -> Self {
        ImageIssue::Decode {
            id: err.id,
            message: err.message,
        }
    }
}

impl From<EncoderInferenceError> for ImageIssue {
    fn from(err: EncoderInferenceError) -> Self {
        ImageIssue::Inference {
            id: err.id,
            message: err.message,
        }
    }
}
