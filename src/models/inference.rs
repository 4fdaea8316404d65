//! Single-model inference engine

use crate::config::ModelConfig;
use crate::error::{PredictError, PredictResult, StartupError};
use crate::models::loader::{LoadedModel, ModelInfo, ModelLoader};
use crate::models::Predictor;
use crate::types::FeatureInput;
use std::collections::HashMap;
use tracing::debug;

/// Owns the loaded model for the lifetime of the process.
///
/// Construction is the readiness gate: an engine only exists once its
/// artifact has been fetched and deserialized, and nothing mutates it
/// afterwards, so it can be shared across request tasks behind an `Arc`.
pub struct InferenceEngine {
    predictor: Box<dyn Predictor>,
    info: ModelInfo,
    /// Feature name -> input position
    name_index: Option<HashMap<String, usize>>,
}

impl InferenceEngine {
    /// Load the configured artifact and build the engine
    pub async fn load(config: &ModelConfig) -> Result<Self, StartupError> {
        let loaded = ModelLoader::from_config(config).load(config).await?;
        Self::from_loaded(loaded)
    }

    /// Wrap an already loaded model
    pub fn from_loaded(loaded: LoadedModel) -> Result<Self, StartupError> {
        let LoadedModel { predictor, info } = loaded;

        let name_index = match &info.feature_names {
            Some(names) => {
                let mut index = HashMap::with_capacity(names.len());
                for (position, name) in names.iter().enumerate() {
                    if index.insert(name.clone(), position).is_some() {
                        return Err(StartupError::InvalidConfig(format!(
                            "duplicate feature name '{}'",
                            name
                        )));
                    }
                }
                Some(index)
            }
            None => None,
        };

        Ok(Self {
            predictor,
            info,
            name_index,
        })
    }

    /// Metadata about the loaded artifact
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Feature count requests must match, when known
    pub fn expected_features(&self) -> Option<usize> {
        self.info.input_width
    }

    /// Resolve request input into an ordered, finite row
    pub fn resolve(&self, input: &FeatureInput) -> PredictResult<Vec<f64>> {
        let row: Vec<f64> = match input {
            FeatureInput::Ordered(values) => values.clone(),
            FeatureInput::Named(values) => {
                let (index, names) = match (&self.name_index, &self.info.feature_names) {
                    (Some(index), Some(names)) => (index, names),
                    _ => return Err(PredictError::FeatureNamesUnavailable),
                };
                if let Some(unknown) = values.keys().find(|name| !index.contains_key(*name)) {
                    return Err(PredictError::UnknownFeature(unknown.clone()));
                }
                names
                    .iter()
                    .map(|name| {
                        values
                            .get(name)
                            .copied()
                            .ok_or_else(|| PredictError::MissingFeature(name.clone()))
                    })
                    .collect::<PredictResult<_>>()?
            }
        };

        if let Some(index) = row.iter().position(|v| !v.is_finite()) {
            return Err(PredictError::NonFiniteFeature { index });
        }
        Ok(row)
    }

    /// Predict a single row of ordered features
    pub fn predict(&self, features: &[f64]) -> PredictResult<i64> {
        if let Some(expected) = self.expected_features() {
            if features.len() != expected {
                return Err(PredictError::ShapeMismatch {
                    expected,
                    actual: features.len(),
                });
            }
        }

        let prediction = self.predictor.predict_row(features)?;
        debug!(features = features.len(), prediction, "Prediction computed");
        Ok(prediction)
    }

    /// Resolve and predict one request input
    pub fn predict_input(&self, input: &FeatureInput) -> PredictResult<i64> {
        let row = self.resolve(input)?;
        self.predict(&row)
    }

    /// Predict every row of a batch, in order.
    ///
    /// The first failing row fails the whole batch and is identified by index.
    pub fn predict_batch(
        &self,
        inputs: &[FeatureInput],
        max_batch_size: usize,
    ) -> PredictResult<Vec<i64>> {
        if inputs.is_empty() {
            return Err(PredictError::EmptyBatch);
        }
        if inputs.len() > max_batch_size {
            return Err(PredictError::BatchTooLarge {
                size: inputs.len(),
                limit: max_batch_size,
            });
        }

        inputs
            .iter()
            .enumerate()
            .map(|(i, input)| self.predict_input(input).map_err(|e| e.at_instance(i)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelFormat;
    use crate::models::linear::LinearModel;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn engine(artifact: &str, feature_names: Option<Vec<&str>>) -> InferenceEngine {
        let model = LinearModel::from_slice(artifact.as_bytes()).unwrap();
        let feature_names = feature_names
            .map(|names| names.into_iter().map(String::from).collect())
            .or_else(|| model.feature_names.clone());
        let info = ModelInfo {
            format: ModelFormat::Linear,
            location: "memory".to_string(),
            size_bytes: artifact.len(),
            loaded_at: Utc::now(),
            input_width: Some(model.weights.len()),
            feature_names,
        };
        InferenceEngine::from_loaded(LoadedModel {
            predictor: Box::new(model),
            info,
        })
        .unwrap()
    }

    fn named(pairs: &[(&str, f64)]) -> FeatureInput {
        FeatureInput::Named(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn test_sum_rule_predictions() {
        let engine = engine(r#"{"weights": [1, 1, 1]}"#, None);
        assert_eq!(engine.predict(&[1.0, 2.0, 3.0]), Ok(1));
        assert_eq!(engine.predict(&[-5.0, 2.0, 1.0]), Ok(0));
    }

    #[test]
    fn test_shape_mismatch_never_predicts() {
        let engine = engine(r#"{"weights": [1, 1, 1]}"#, None);
        assert_eq!(
            engine.predict(&[1.0, 2.0]),
            Err(PredictError::ShapeMismatch { expected: 3, actual: 2 })
        );
        assert_eq!(
            engine.predict(&[1.0, 2.0, 3.0, 4.0]),
            Err(PredictError::ShapeMismatch { expected: 3, actual: 4 })
        );
        assert!(engine.predict(&[]).is_err());
    }

    #[test]
    fn test_prediction_is_idempotent() {
        let engine = engine(r#"{"weights": [0.3, -1.2, 2.0], "bias": 0.1}"#, None);
        let row = [0.7, 0.4, -0.2];
        let first = engine.predict(&row).unwrap();
        for _ in 0..10 {
            assert_eq!(engine.predict(&row).unwrap(), first);
        }
    }

    #[test]
    fn test_resolve_named_features() {
        let engine = engine(
            r#"{"weights": [1, 1, 1]}"#,
            Some(vec!["age", "visits", "los"]),
        );
        let row = engine
            .resolve(&named(&[("los", 3.0), ("age", 1.0), ("visits", 2.0)]))
            .unwrap();
        assert_eq!(row, vec![1.0, 2.0, 3.0]);

        assert_eq!(
            engine.predict_input(&named(&[("age", 1.0), ("visits", 2.0)])),
            Err(PredictError::MissingFeature("los".to_string()))
        );
        assert_eq!(
            engine.predict_input(&named(&[
                ("age", 1.0),
                ("visits", 2.0),
                ("los", 3.0),
                ("zip", 9.0)
            ])),
            Err(PredictError::UnknownFeature("zip".to_string()))
        );
    }

    #[test]
    fn test_named_features_need_names() {
        let engine = engine(r#"{"weights": [1, 1]}"#, None);
        assert_eq!(
            engine.predict_input(&named(&[("a", 1.0), ("b", 2.0)])),
            Err(PredictError::FeatureNamesUnavailable)
        );
    }

    #[test]
    fn test_names_from_artifact() {
        let engine = engine(r#"{"weights": [1, -1], "feature_names": ["x", "y"]}"#, None);
        assert_eq!(engine.predict_input(&named(&[("x", 5.0), ("y", 1.0)])), Ok(1));
        assert_eq!(engine.predict_input(&named(&[("x", 1.0), ("y", 5.0)])), Ok(0));
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let engine = engine(r#"{"weights": [1, 1]}"#, None);
        assert_eq!(
            engine.predict_input(&FeatureInput::Ordered(vec![1.0, f64::INFINITY])),
            Err(PredictError::NonFiniteFeature { index: 1 })
        );
        assert_eq!(
            engine.predict_input(&FeatureInput::Ordered(vec![f64::NAN, 1.0])),
            Err(PredictError::NonFiniteFeature { index: 0 })
        );
    }

    #[test]
    fn test_values_resolved_at_full_precision() {
        let engine = engine(r#"{"weights": [1, 1, 1]}"#, Some(vec!["a", "b", "c"]));

        let huge = FeatureInput::Ordered(vec![1e39, 0.0, 0.0]);
        assert_eq!(engine.resolve(&huge), Ok(vec![1e39, 0.0, 0.0]));
        assert_eq!(engine.predict_input(&huge), Ok(1));

        let tiny = named(&[("a", 1e-46), ("b", 0.0), ("c", 0.0)]);
        assert_eq!(engine.predict_input(&tiny), Ok(1));

        let cancelling = FeatureInput::Ordered(vec![16_777_217.0, -16_777_216.0, 0.0]);
        assert_eq!(engine.predict_input(&cancelling), Ok(1));
    }

    #[test]
    fn test_batch_prediction() {
        let engine = engine(r#"{"weights": [1, 1, 1]}"#, None);
        let batch = vec![
            FeatureInput::from(vec![1.0, 2.0, 3.0]),
            FeatureInput::from(vec![-5.0, 2.0, 1.0]),
        ];
        assert_eq!(engine.predict_batch(&batch, 10), Ok(vec![1, 0]));

        let bad = vec![
            FeatureInput::from(vec![1.0, 2.0, 3.0]),
            FeatureInput::from(vec![1.0]),
        ];
        let err = engine.predict_batch(&bad, 10).unwrap_err();
        assert_eq!(err.kind(), "shape_mismatch");
        assert!(matches!(err, PredictError::Instance { index: 1, .. }));

        assert_eq!(engine.predict_batch(&[], 10), Err(PredictError::EmptyBatch));
        assert_eq!(
            engine.predict_batch(&batch, 1),
            Err(PredictError::BatchTooLarge { size: 2, limit: 1 })
        );
    }

    #[test]
    fn test_duplicate_feature_names_rejected() {
        let model = LinearModel::from_slice(br#"{"weights": [1, 1]}"#).unwrap();
        let info = ModelInfo {
            format: ModelFormat::Linear,
            location: "memory".to_string(),
            size_bytes: 0,
            loaded_at: Utc::now(),
            input_width: Some(2),
            feature_names: Some(vec!["a".to_string(), "a".to_string()]),
        };
        let result = InferenceEngine::from_loaded(LoadedModel {
            predictor: Box::new(model),
            info,
        });
        assert!(matches!(result, Err(StartupError::InvalidConfig(_))));
    }
}
