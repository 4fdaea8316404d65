//! Shared fixtures for the HTTP integration tests.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use predict_service::config::{AppConfig, ModelConfig};
use predict_service::{server, AppState, InferenceEngine, ServiceMetrics};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Outputs 1 when the feature sum is positive, 0 otherwise
pub const SUM_RULE: &str =
    r#"{"weights": [1.0, 1.0, 1.0], "bias": 0.0, "task": "classification", "threshold": 0.0}"#;

/// Same rule, with feature names baked into the artifact
pub const NAMED_SUM_RULE: &str = r#"{
    "weights": [1.0, 1.0, 1.0],
    "feature_names": ["age", "income", "visits"]
}"#;

/// Temporary directory holding model artifacts
pub struct ArtifactDir {
    pub dir: TempDir,
}

impl ArtifactDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    /// Write an artifact and return its path
    pub fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("Failed to write artifact");
        path
    }

    pub fn model_config(&self, name: &str, contents: &[u8]) -> ModelConfig {
        let path = self.write(name, contents);
        ModelConfig {
            location: path.display().to_string(),
            ..AppConfig::default().model
        }
    }
}

/// Path of a committed model fixture under `tests/fixtures`
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A router over a loaded model, driven in-process
pub struct TestService {
    pub app: Router,
    pub metrics: Arc<ServiceMetrics>,
    _artifacts: Option<ArtifactDir>,
}

impl TestService {
    pub async fn start(artifact: &str) -> Self {
        Self::start_with(artifact, |_| {}).await
    }

    /// Serve a linear artifact written to a temp dir
    pub async fn start_with(artifact: &str, customize: impl FnOnce(&mut AppConfig)) -> Self {
        let artifacts = ArtifactDir::new();
        let mut config = AppConfig::default();
        config.model = artifacts.model_config("rule.json", artifact.as_bytes());
        config.server.max_batch_size = 8;
        customize(&mut config);
        Self::start_config(config, Some(artifacts)).await
    }

    /// Serve a committed fixture
    pub async fn start_fixture(name: &str) -> Self {
        let mut config = AppConfig::default();
        config.model.location = fixture_path(name).display().to_string();
        config.server.max_batch_size = 8;
        Self::start_config(config, None).await
    }

    async fn start_config(config: AppConfig, artifacts: Option<ArtifactDir>) -> Self {
        let engine = InferenceEngine::load(&config.model)
            .await
            .expect("Failed to load test model");
        let metrics = Arc::new(ServiceMetrics::new());
        let state = AppState::new(Arc::new(engine), metrics.clone(), &config.server);

        Self {
            app: server::router(state, config.server.max_request_bytes),
            metrics,
            _artifacts: artifacts,
        }
    }

    pub async fn post_raw(&self, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.post_raw(uri, body.to_string()).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Router returned an error");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}
