//! Model artifact loader

use super::artifact::ArtifactLocation;
use super::linear::LinearModel;
use super::Predictor;
use crate::config::{ModelConfig, ModelFormat};
use crate::error::StartupError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Metadata describing the loaded artifact
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub format: ModelFormat,
    /// Source location (query strings stripped)
    pub location: String,
    pub size_bytes: usize,
    pub loaded_at: DateTime<Utc>,
    /// Feature count requests must match, when known
    pub input_width: Option<usize>,
    /// Feature names in input order, when known
    pub feature_names: Option<Vec<String>>,
}

/// Loaded model ready to be wrapped by the inference engine
pub struct LoadedModel {
    pub predictor: Box<dyn Predictor>,
    pub info: ModelInfo,
}

/// Loader that fetches an artifact and deserializes it with the right backend
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
    /// Timeout for remote artifact downloads
    fetch_timeout: Duration,
}

impl ModelLoader {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            onnx_threads: config.onnx_threads,
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
        }
    }

    /// Fetch, deserialize and reconcile the configured artifact.
    ///
    /// Every failure here is fatal for the service.
    pub async fn load(&self, config: &ModelConfig) -> Result<LoadedModel, StartupError> {
        let location = ArtifactLocation::parse(&config.location)?;
        let format = config
            .resolved_format()
            .ok_or_else(|| StartupError::UnsupportedFormat(location.to_string()))?;

        info!(location = %location, format = format.as_str(), "Loading model artifact");

        let bytes = location.fetch(self.fetch_timeout).await?;
        let predictor = self.deserialize(format, &location.to_string(), &bytes)?;

        let (input_width, feature_names) = reconcile(predictor.as_ref(), config)?;
        if input_width.is_none() {
            warn!(
                location = %location,
                "Model does not fix its input width; set model.features so wrong-sized requests are rejected as shape mismatches"
            );
        }

        let info = ModelInfo {
            format: predictor.format(),
            location: location.to_string(),
            size_bytes: bytes.len(),
            loaded_at: Utc::now(),
            input_width,
            feature_names,
        };

        info!(
            format = format.as_str(),
            size_bytes = info.size_bytes,
            input_width = ?info.input_width,
            named_features = info.feature_names.is_some(),
            "Model loaded successfully"
        );

        Ok(LoadedModel { predictor, info })
    }

    /// Deserialize artifact bytes with the backend for `format`
    pub fn deserialize(
        &self,
        format: ModelFormat,
        location: &str,
        bytes: &[u8],
    ) -> Result<Box<dyn Predictor>, StartupError> {
        let corrupt = |reason: String| StartupError::ArtifactCorrupt {
            location: location.to_string(),
            reason,
        };

        if bytes.is_empty() {
            return Err(corrupt("artifact is empty".to_string()));
        }

        match format {
            ModelFormat::Linear => Ok(Box::new(LinearModel::from_slice(bytes).map_err(corrupt)?)),
            ModelFormat::Onnx => self.deserialize_onnx(bytes).map_err(corrupt),
        }
    }

    #[cfg(feature = "onnx")]
    fn deserialize_onnx(&self, bytes: &[u8]) -> Result<Box<dyn Predictor>, String> {
        let model = super::onnx::OnnxModel::from_memory(bytes, self.onnx_threads)?;
        Ok(Box::new(model))
    }

    #[cfg(not(feature = "onnx"))]
    fn deserialize_onnx(&self, _bytes: &[u8]) -> Result<Box<dyn Predictor>, String> {
        let _ = self.onnx_threads;
        Err("this build does not include ONNX support (enable the `onnx` feature)".to_string())
    }
}

/// Combine what the artifact declares with what the configuration declares.
///
/// Artifact metadata wins; configuration fills gaps. Disagreement on the
/// feature count is a startup failure.
fn reconcile(
    predictor: &dyn Predictor,
    config: &ModelConfig,
) -> Result<(Option<usize>, Option<Vec<String>>), StartupError> {
    let configured_width = config
        .features
        .or_else(|| config.feature_names.as_ref().map(Vec::len));

    let input_width = match (predictor.input_width(), configured_width) {
        (Some(declared), Some(configured)) if declared != configured => {
            return Err(StartupError::InvalidConfig(format!(
                "artifact expects {} features but configuration declares {}",
                declared, configured
            )));
        }
        (declared, configured) => declared.or(configured),
    };

    let feature_names = match (predictor.feature_names(), &config.feature_names) {
        (Some(declared), Some(configured)) => {
            if declared != configured.as_slice() {
                warn!("model.feature_names differs from the names stored in the artifact; using the artifact's");
            }
            Some(declared.to_vec())
        }
        (Some(declared), None) => Some(declared.to_vec()),
        (None, configured) => configured.clone(),
    };

    Ok((input_width, feature_names))
}
