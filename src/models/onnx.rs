//! ONNX model backend

use super::Predictor;
use crate::config::ModelFormat;
use crate::error::{PredictError, PredictResult};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{Tensor, ValueType};
use std::sync::Mutex;
use tracing::{debug, info};

/// ONNX Runtime session plus the tensor names it is driven through
pub struct OnnxModel {
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    input_width: Option<usize>,
}

impl OnnxModel {
    /// Build a session from serialized graph bytes
    pub fn from_memory(bytes: &[u8], onnx_threads: usize) -> Result<Self, String> {
        let session = Session::builder()
            .map_err(|e| e.to_string())?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| e.to_string())?
            .with_intra_threads(onnx_threads)
            .map_err(|e| e.to_string())?
            .commit_from_memory(bytes)
            .map_err(|e| e.to_string())?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| "graph declares no inputs".to_string())?;
        let input_name = input.name.clone();
        let input_width = match &input.input_type {
            ValueType::Tensor { shape, .. } => {
                shape.last().copied().filter(|d| *d > 0).map(|d| d as usize)
            }
            _ => None,
        };

        // classifiers exported from scikit-learn expose `label` then `probabilities`
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .ok_or_else(|| "graph declares no outputs".to_string())?;

        info!(
            input = %input_name,
            output = %output_name,
            input_width = ?input_width,
            threads = onnx_threads,
            "ONNX session created"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_width,
        })
    }
}

impl Predictor for OnnxModel {
    fn format(&self) -> ModelFormat {
        ModelFormat::Onnx
    }

    fn input_width(&self) -> Option<usize> {
        self.input_width
    }

    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    fn predict_row(&self, row: &[f64]) -> PredictResult<i64> {
        let row = narrow_row(row)?;
        let input = Tensor::from_array((vec![1_i64, row.len() as i64], row))
            .map_err(|e| PredictError::InferenceFailed(e.to_string()))?;

        // poisoning carries no invariant for the session
        let mut session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| PredictError::InferenceFailed(e.to_string()))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            PredictError::InferenceFailed(format!("output '{}' missing", self.output_name))
        })?;

        if let Ok((_, labels)) = output.try_extract_tensor::<i64>() {
            debug!(output = %self.output_name, "Extracted label tensor");
            return labels
                .first()
                .copied()
                .ok_or_else(|| PredictError::InferenceFailed("empty label tensor".to_string()));
        }

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| PredictError::InferenceFailed(e.to_string()))?;
        let dims: Vec<i64> = shape.iter().copied().collect();
        interpret_scores(&dims, data)
    }
}

/// Narrow a request row to the `f32` tensor the graph consumes.
///
/// Values whose magnitude exceeds `f32::MAX` are refused rather than
/// silently becoming infinities.
pub(crate) fn narrow_row(row: &[f64]) -> PredictResult<Vec<f32>> {
    row.iter()
        .enumerate()
        .map(|(index, value)| {
            let narrowed = *value as f32;
            if narrowed.is_finite() {
                Ok(narrowed)
            } else {
                Err(PredictError::FeatureOutOfRange {
                    index,
                    value: *value,
                })
            }
        })
        .collect()
}

/// Turn a float output of a single-row batch into an integer prediction.
///
/// `[1, k]` / `[k]` with `k >= 2` is read as per-class scores and yields the
/// arg-max index. Anything else is read as a scalar and truncated toward zero.
pub(crate) fn interpret_scores(dims: &[i64], data: &[f32]) -> PredictResult<i64> {
    let classes = match dims {
        [_, k] | [k] => *k,
        _ => 1,
    };

    if classes >= 2 {
        let row = data
            .get(..classes as usize)
            .ok_or_else(|| PredictError::InferenceFailed("score tensor too short".to_string()))?;
        if row.iter().any(|v| !v.is_finite()) {
            return Err(PredictError::InferenceFailed("non-finite class score".to_string()));
        }
        let best = row
            .iter()
            .enumerate()
            .fold(0, |best, (i, v)| if *v > row[best] { i } else { best });
        return Ok(best as i64);
    }

    let value = *data
        .first()
        .ok_or_else(|| PredictError::InferenceFailed("empty output tensor".to_string()))?;
    if !value.is_finite() {
        return Err(PredictError::InferenceFailed(format!(
            "output {} is not finite",
            value
        )));
    }
    let truncated = value.trunc();
    if truncated < i64::MIN as f32 || truncated >= i64::MAX as f32 {
        return Err(PredictError::InferenceFailed(format!(
            "output {} does not fit an integer",
            value
        )));
    }
    Ok(truncated as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_row_argmax() {
        assert_eq!(interpret_scores(&[1, 2], &[0.3, 0.7]), Ok(1));
        assert_eq!(interpret_scores(&[1, 3], &[0.6, 0.3, 0.1]), Ok(0));
        assert_eq!(interpret_scores(&[3], &[0.1, 0.1, 0.8]), Ok(2));
        // ties keep the lowest class
        assert_eq!(interpret_scores(&[1, 2], &[0.5, 0.5]), Ok(0));
    }

    #[test]
    fn test_scalar_output_truncates() {
        assert_eq!(interpret_scores(&[1, 1], &[2.9]), Ok(2));
        assert_eq!(interpret_scores(&[1], &[-2.9]), Ok(-2));
        assert_eq!(interpret_scores(&[], &[4.0]), Ok(4));
    }

    #[test]
    fn test_bad_outputs_fail() {
        assert!(interpret_scores(&[1, 1], &[]).is_err());
        assert!(interpret_scores(&[1, 1], &[f32::NAN]).is_err());
        assert!(interpret_scores(&[1, 2], &[0.1, f32::INFINITY]).is_err());
        assert!(interpret_scores(&[1, 3], &[0.1, 0.2]).is_err());
        assert!(interpret_scores(&[1], &[1e30]).is_err());
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(OnnxModel::from_memory(b"definitely not a protobuf graph", 1).is_err());
    }

    #[test]
    fn test_narrow_row() {
        assert_eq!(narrow_row(&[1.0, -2.5, 1e-46]), Ok(vec![1.0, -2.5, 0.0]));
        assert_eq!(
            narrow_row(&[0.0, 1e39, 0.0]),
            Err(PredictError::FeatureOutOfRange { index: 1, value: 1e39 })
        );
        assert!(narrow_row(&[-1e300]).is_err());
    }

    // Both fixtures compute `sum(features) > 0` cast to int64 and exported as `label`.
    // `sum_rule.onnx` takes float[batch, 3]; `sum_rule_dynamic.onnx` leaves the
    // feature dimension symbolic.
    mod graphs {
        use super::super::OnnxModel;
        use crate::config::{AppConfig, ModelConfig};
        use crate::error::PredictError;
        use crate::models::inference::InferenceEngine;
        use crate::models::{ModelLoader, Predictor};

        fn fixture(name: &str) -> ModelConfig {
            ModelConfig {
                location: format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name),
                ..AppConfig::default().model
            }
        }

        fn fixture_bytes(name: &str) -> Vec<u8> {
            std::fs::read(fixture(name).location).unwrap()
        }

        #[test]
        fn test_graph_metadata() {
            let model = OnnxModel::from_memory(&fixture_bytes("sum_rule.onnx"), 1).unwrap();
            assert_eq!(model.input_name, "features");
            assert_eq!(model.output_name, "label");
            assert_eq!(model.input_width(), Some(3));
            assert_eq!(model.feature_names(), None);

            let dynamic =
                OnnxModel::from_memory(&fixture_bytes("sum_rule_dynamic.onnx"), 1).unwrap();
            assert_eq!(dynamic.input_width(), None);
        }

        #[tokio::test]
        async fn test_sum_rule_through_loader() {
            let config = fixture("sum_rule.onnx");
            let loaded = ModelLoader::from_config(&config).load(&config).await.unwrap();
            assert_eq!(loaded.info.input_width, Some(3));

            let engine = InferenceEngine::from_loaded(loaded).unwrap();
            assert_eq!(engine.predict(&[1.0, 2.0, 3.0]), Ok(1));
            assert_eq!(engine.predict(&[-5.0, 2.0, 1.0]), Ok(0));
            assert_eq!(engine.predict(&[0.0, 0.0, 0.0]), Ok(0));
            assert_eq!(
                engine.predict(&[1.0, 2.0]),
                Err(PredictError::ShapeMismatch { expected: 3, actual: 2 })
            );
            assert!(matches!(
                engine.predict(&[1e39, 0.0, 0.0]),
                Err(PredictError::FeatureOutOfRange { index: 0, .. })
            ));
        }

        #[test]
        fn test_concurrent_runs_share_one_session() {
            let model = OnnxModel::from_memory(&fixture_bytes("sum_rule.onnx"), 1).unwrap();

            std::thread::scope(|scope| {
                let handles: Vec<_> = (0..8)
                    .map(|i| {
                        let model = &model;
                        scope.spawn(move || {
                            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                            (i, model.predict_row(&[sign, sign * 2.0, sign * 3.0]))
                        })
                    })
                    .collect();

                for handle in handles {
                    let (i, prediction) = handle.join().unwrap();
                    assert_eq!(prediction, Ok(if i % 2 == 0 { 1 } else { 0 }));
                }
            });
        }

        #[tokio::test]
        async fn test_dynamic_width_filled_from_config() {
            let mut config = fixture("sum_rule_dynamic.onnx");
            let loaded = ModelLoader::from_config(&config).load(&config).await.unwrap();
            assert_eq!(loaded.info.input_width, None);

            config.features = Some(3);
            let loaded = ModelLoader::from_config(&config).load(&config).await.unwrap();
            assert_eq!(loaded.info.input_width, Some(3));

            let engine = InferenceEngine::from_loaded(loaded).unwrap();
            assert_eq!(engine.predict(&[1.0, 2.0, 3.0]), Ok(1));
            assert_eq!(
                engine.predict(&[1.0, 2.0, 3.0, 4.0]),
                Err(PredictError::ShapeMismatch { expected: 3, actual: 4 })
            );
        }
    }
}
