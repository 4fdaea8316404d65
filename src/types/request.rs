//! Prediction request payloads

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Feature values for one prediction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureInput {
    /// Values in model input order
    Ordered(Vec<f64>),
    /// Values keyed by feature name; resolved against the model's feature names
    Named(BTreeMap<String, f64>),
}

impl From<Vec<f64>> for FeatureInput {
    fn from(values: Vec<f64>) -> Self {
        FeatureInput::Ordered(values)
    }
}

/// Body of `POST /predict`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub features: FeatureInput,
}

/// Body of `POST /predict/batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPredictRequest {
    pub instances: Vec<FeatureInput>,
}
