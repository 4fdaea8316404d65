//! Load generator for the prediction service
//!
//! Posts random feature vectors to `/predict` and reports the label
//! distribution and error counts.

use clap::Parser;
use futures::stream::{self, StreamExt};
use predict_service::types::{FeatureInput, PredictRequest, PredictResponse};
use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "predict-client", about = "Send random prediction requests")]
struct Args {
    /// Base URL of the prediction service
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    /// Number of requests to send
    #[arg(short = 'n', long, default_value_t = 100)]
    count: u64,

    /// Features per request; read from GET /model when omitted
    #[arg(short, long)]
    features: Option<usize>,

    /// Requests in flight at once
    #[arg(short, long, default_value_t = 8)]
    concurrency: usize,

    /// Fraction of requests sent with the wrong number of features
    #[arg(long, default_value_t = 0.0)]
    malformed_rate: f64,

    /// Print requests instead of sending them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    input_width: Option<usize>,
}

/// Random feature vector generator
struct FeatureGenerator {
    rng: rand::rngs::ThreadRng,
    width: usize,
    malformed_rate: f64,
}

impl FeatureGenerator {
    fn new(width: usize, malformed_rate: f64) -> Self {
        Self {
            rng: rand::thread_rng(),
            width,
            malformed_rate,
        }
    }

    fn generate(&mut self) -> PredictRequest {
        let width = if self.rng.gen_bool(self.malformed_rate) {
            // off by one, never zero
            if self.width > 1 && self.rng.gen_bool(0.5) {
                self.width - 1
            } else {
                self.width + 1
            }
        } else {
            self.width
        };

        let values = (0..width).map(|_| self.rng.gen_range(-10.0..10.0)).collect();
        PredictRequest {
            features: FeatureInput::Ordered(values),
        }
    }
}

#[derive(Debug)]
enum Outcome {
    Label(i64),
    Rejected(u16),
    Failed(String),
}

async fn send(client: &reqwest::Client, url: &str, request: &PredictRequest) -> Outcome {
    let response = match client.post(url).json(request).send().await {
        Ok(r) => r,
        Err(e) => return Outcome::Failed(e.to_string()),
    };

    let status = response.status();
    if !status.is_success() {
        return Outcome::Rejected(status.as_u16());
    }

    match response.json::<PredictResponse>().await {
        Ok(body) => Outcome::Label(body.prediction),
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

async fn discover_width(client: &reqwest::Client, base: &str) -> anyhow::Result<usize> {
    let info: ModelInfo = client
        .get(format!("{}/model", base))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    info.input_width
        .ok_or_else(|| anyhow::anyhow!("Model does not declare its input width; pass --features"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("predict_client=info".parse()?),
        )
        .init();

    let args = Args::parse();
    if !(0.0..=1.0).contains(&args.malformed_rate) {
        anyhow::bail!("--malformed-rate must be within [0, 1]");
    }

    let base = args.url.trim_end_matches('/').to_string();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let width = match (args.features, args.dry_run) {
        (Some(width), _) => width,
        (None, true) => 3,
        (None, false) => discover_width(&client, &base).await?,
    };

    info!(
        url = %base,
        count = args.count,
        features = width,
        concurrency = args.concurrency,
        malformed_rate = args.malformed_rate,
        "Configuration loaded"
    );

    let mut generator = FeatureGenerator::new(width, args.malformed_rate);
    let requests: Vec<PredictRequest> = (0..args.count).map(|_| generator.generate()).collect();

    if args.dry_run {
        for (i, request) in requests.iter().enumerate().take(5) {
            info!("Sample request {}: {}", i + 1, serde_json::to_string(request)?);
        }
        return Ok(());
    }

    let url = format!("{}/predict", base);
    let start = Instant::now();

    let outcomes: Vec<Outcome> = stream::iter(requests.iter())
        .map(|request| send(&client, &url, request))
        .buffer_unordered(args.concurrency.max(1))
        .collect()
        .await;

    let elapsed = start.elapsed();
    let mut labels: BTreeMap<i64, u64> = BTreeMap::new();
    let mut rejected: BTreeMap<u16, u64> = BTreeMap::new();
    let mut failed = 0u64;

    for outcome in outcomes {
        match outcome {
            Outcome::Label(label) => *labels.entry(label).or_insert(0) += 1,
            Outcome::Rejected(status) => *rejected.entry(status).or_insert(0) += 1,
            Outcome::Failed(reason) => {
                failed += 1;
                warn!(error = %reason, "Request failed");
            }
        }
    }

    info!(
        "Completed {} requests in {:.2}s ({:.1} req/s)",
        args.count,
        elapsed.as_secs_f64(),
        args.count as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    info!(labels = ?labels, rejected = ?rejected, failed, "Results");

    Ok(())
}
