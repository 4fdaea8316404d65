//! Request metrics and periodic summaries for the prediction service.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept for percentile estimates
const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector shared by all request handlers
pub struct ServiceMetrics {
    /// Requests that produced predictions
    pub requests_succeeded: AtomicU64,
    /// Requests that failed
    pub requests_failed: AtomicU64,
    /// Individual predictions returned (batch rows count separately)
    pub predictions_served: AtomicU64,
    /// Failures by error kind
    errors_by_kind: RwLock<HashMap<String, u64>>,
    /// Request latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// How often each label was predicted
    label_counts: RwLock<BTreeMap<i64, u64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServiceMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            requests_succeeded: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            predictions_served: AtomicU64::new(0),
            errors_by_kind: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            label_counts: RwLock::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a successful request and the labels it returned
    pub fn record_success(&self, latency: Duration, labels: &[i64]) {
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
        self.predictions_served
            .fetch_add(labels.len() as u64, Ordering::Relaxed);
        self.record_latency(latency);

        if let Ok(mut counts) = self.label_counts.write() {
            for label in labels {
                *counts.entry(*label).or_insert(0) += 1;
            }
        }
    }

    /// Record a failed request
    pub fn record_failure(&self, latency: Duration, kind: &str) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);

        if let Ok(mut by_kind) = self.errors_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    fn record_latency(&self, latency: Duration) {
        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            // drop the older half once the window fills
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }
    }

    /// Get request latency statistics
    pub fn get_latency_stats(&self) -> LatencyStats {
        let mut sorted: Vec<u64> = match self.latencies.read() {
            Ok(times) => times.clone(),
            Err(_) => return LatencyStats::default(),
        };
        if sorted.is_empty() {
            return LatencyStats::default();
        }
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let total = self.requests_succeeded.load(Ordering::Relaxed)
            + self.requests_failed.load(Ordering::Relaxed);
        if elapsed > 0.0 {
            total as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get failures by error kind
    pub fn get_errors_by_kind(&self) -> HashMap<String, u64> {
        self.errors_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Get label distribution
    pub fn get_label_counts(&self) -> BTreeMap<i64, u64> {
        self.label_counts
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Point-in-time copy of every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            predictions_served: self.predictions_served.load(Ordering::Relaxed),
            throughput_rps: self.get_throughput(),
            latency: self.get_latency_stats(),
            errors_by_kind: self.get_errors_by_kind(),
            label_counts: self
                .get_label_counts()
                .into_iter()
                .map(|(label, count)| (label.to_string(), count))
                .collect(),
        }
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let total = snapshot.requests_succeeded + snapshot.requests_failed;
        let error_rate = if total > 0 {
            (snapshot.requests_failed as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        info!(
            requests = total,
            failed = snapshot.requests_failed,
            error_rate = format!("{:.1}%", error_rate),
            predictions = snapshot.predictions_served,
            throughput = format!("{:.1} req/s", snapshot.throughput_rps),
            "Service metrics summary"
        );
        info!(
            mean_us = snapshot.latency.mean_us,
            p50_us = snapshot.latency.p50_us,
            p95_us = snapshot.latency.p95_us,
            p99_us = snapshot.latency.p99_us,
            max_us = snapshot.latency.max_us,
            "Request latency"
        );
        for (label, count) in &snapshot.label_counts {
            let pct = if snapshot.predictions_served > 0 {
                (*count as f64 / snapshot.predictions_served as f64) * 100.0
            } else {
                0.0
            };
            info!(label = %label, count, share = format!("{:.1}%", pct), "Predicted label");
        }
        for (kind, count) in &snapshot.errors_by_kind {
            info!(kind = %kind, count, "Request failures");
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Request latency statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Serializable metrics view served on `/stats`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub predictions_served: u64,
    pub throughput_rps: f64,
    pub latency: LatencyStats,
    pub errors_by_kind: HashMap<String, u64>,
    /// Keyed by label rendered as a string (JSON object keys)
    pub label_counts: BTreeMap<String, u64>,
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let period = Duration::from_secs(self.interval_secs.max(1));
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
