//! Model artifacts, backends and the inference engine

pub mod artifact;
pub mod inference;
pub mod linear;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use artifact::ArtifactLocation;
pub use inference::InferenceEngine;
pub use loader::{LoadedModel, ModelInfo, ModelLoader};

use crate::config::ModelFormat;
use crate::error::PredictResult;

/// A deserialized model that maps one feature row to an integer prediction.
///
/// Implementations are immutable after construction and shared across
/// request tasks.
pub trait Predictor: Send + Sync {
    /// Artifact format this backend was loaded from
    fn format(&self) -> ModelFormat;

    /// Number of input features, when the artifact declares it
    fn input_width(&self) -> Option<usize>;

    /// Feature names in input order, when the artifact declares them
    fn feature_names(&self) -> Option<&[String]>;

    /// Run the model on a single-row batch and return its only result
    fn predict_row(&self, row: &[f64]) -> PredictResult<i64>;
}
