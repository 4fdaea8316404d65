//! Request and response payloads of the HTTP API

pub mod request;
pub mod response;

pub use request::{BatchPredictRequest, FeatureInput, PredictRequest};
pub use response::{BatchPredictResponse, ErrorBody, HealthResponse, PredictResponse};
