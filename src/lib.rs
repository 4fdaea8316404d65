//! Single-model prediction service
//!
//! Loads a pre-trained model artifact once at startup and serves
//! synchronous predictions over HTTP.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod server;
pub mod shutdown;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use error::{PredictError, StartupError};
pub use metrics::ServiceMetrics;
pub use models::inference::InferenceEngine;
pub use server::AppState;
pub use types::{FeatureInput, PredictRequest, PredictResponse};

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

/// Load the model, then serve until shutdown.
///
/// The listener is bound only after the artifact has loaded; any load
/// failure is returned before a single request can be accepted.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let engine = InferenceEngine::load(&config.model)
        .await
        .context("Model artifact failed to load; refusing to start")?;
    let engine = Arc::new(engine);

    let metrics = Arc::new(ServiceMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter =
            metrics::MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let state = AppState::new(engine, metrics.clone(), &config.server);
    server::serve(state, &config.server).await?;

    metrics.print_summary();
    info!("Shutdown complete");
    Ok(())
}
