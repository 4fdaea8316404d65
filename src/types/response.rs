//! Prediction response payloads

use serde::{Deserialize, Serialize};

/// Body of a successful `POST /predict`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictResponse {
    pub prediction: i64,
}

/// Body of a successful `POST /predict/batch`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchPredictResponse {
    pub predictions: Vec<i64>,
}

/// Body of every failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_format: String,
    pub uptime_secs: u64,
}
