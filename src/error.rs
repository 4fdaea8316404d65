//! Error types for the prediction service.
//!
//! Two families exist and they never mix:
//!
//! - [`StartupError`]: the artifact could not be turned into a ready model.
//!   These are fatal; the process exits before a listener is bound.
//! - [`PredictError`]: a single request could not be answered. These are
//!   returned to the caller and leave the loaded model untouched.

use std::io;
use thiserror::Error;

/// Failure while locating, fetching or deserializing the model artifact.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("model artifact not found at {0}")]
    ArtifactMissing(String),

    #[error("failed to read model artifact {location}: {source}")]
    ArtifactRead {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to fetch model artifact {location}: {reason}")]
    ArtifactFetch { location: String, reason: String },

    #[error("model artifact {location} is corrupt or incompatible: {reason}")]
    ArtifactCorrupt { location: String, reason: String },

    #[error("unsupported artifact location '{0}' (expected a path, file://, http:// or https://)")]
    UnsupportedLocation(String),

    #[error("cannot determine model format for {0}; set model.format explicitly")]
    UnsupportedFormat(String),

    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
}

/// Failure of one predict call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictError {
    #[error("expected {expected} features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("feature at index {index} is not a finite number")]
    NonFiniteFeature { index: usize },

    #[error("feature at index {index} ({value}) is outside the range the model accepts")]
    FeatureOutOfRange { index: usize, value: f64 },

    #[error("missing feature '{0}'")]
    MissingFeature(String),

    #[error("unknown feature '{0}'")]
    UnknownFeature(String),

    #[error("named features are not supported: the model declares no feature names")]
    FeatureNamesUnavailable,

    #[error("batch must contain at least one instance")]
    EmptyBatch,

    #[error("batch of {size} instances exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("instance {index}: {source}")]
    Instance {
        index: usize,
        #[source]
        source: Box<PredictError>,
    },

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

impl PredictError {
    /// True when the caller sent something the model cannot accept.
    pub fn is_client_error(&self) -> bool {
        match self {
            PredictError::InferenceFailed(_) => false,
            PredictError::Instance { source, .. } => source.is_client_error(),
            _ => true,
        }
    }

    /// Stable machine-readable tag used in error bodies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::ShapeMismatch { .. } => "shape_mismatch",
            PredictError::NonFiniteFeature { .. } => "non_finite_feature",
            PredictError::FeatureOutOfRange { .. } => "feature_out_of_range",
            PredictError::MissingFeature(_) => "missing_feature",
            PredictError::UnknownFeature(_) => "unknown_feature",
            PredictError::FeatureNamesUnavailable => "feature_names_unavailable",
            PredictError::EmptyBatch => "empty_batch",
            PredictError::BatchTooLarge { .. } => "batch_too_large",
            PredictError::Instance { source, .. } => source.kind(),
            PredictError::InferenceFailed(_) => "inference_failed",
        }
    }

    /// Tag an error with the batch row it came from.
    pub fn at_instance(self, index: usize) -> Self {
        PredictError::Instance {
            index,
            source: Box::new(self),
        }
    }
}

/// Result alias for predict operations.
pub type PredictResult<T> = std::result::Result<T, PredictError>;
