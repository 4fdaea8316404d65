//! Configuration management for the prediction service

use crate::training::TrainingJobSpec;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file, loaded only if present
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable prefix; nested keys use `__` (e.g. `PREDICT__MODEL__LOCATION`)
pub const ENV_PREFIX: &str = "PREDICT";

/// Serialized model formats the service can deserialize
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// JSON linear model (weights, bias, decision threshold)
    Linear,
    /// ONNX graph executed by ONNX Runtime
    Onnx,
}

impl ModelFormat {
    /// Infer the format from a location's file extension
    pub fn from_extension(location: &str) -> Option<Self> {
        let path = location.split(['?', '#']).next().unwrap_or(location);
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(ModelFormat::Linear),
            "onnx" => Some(ModelFormat::Onnx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFormat::Linear => "linear",
            ModelFormat::Onnx => "onnx",
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    /// Declaration of the external training job, if this deployment has one
    #[serde(default)]
    pub training: Option<TrainingJobSpec>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Maximum number of predictions computed at the same time
    pub workers: usize,
    /// Request body limit in bytes
    pub max_request_bytes: usize,
    /// Maximum rows accepted by the batch endpoint
    pub max_batch_size: usize,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Where the artifact lives: a path, `file://` URI or `http(s)://` URL
    pub location: String,
    /// Artifact format; inferred from the extension when absent
    #[serde(default)]
    pub format: Option<ModelFormat>,
    /// Expected feature count, for artifacts that do not declare one
    #[serde(default)]
    pub features: Option<usize>,
    /// Feature names in model input order, used to resolve named requests
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    /// Number of intra-op threads for ONNX inference
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
    /// Timeout for fetching remote artifacts
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_onnx_threads() -> usize {
    1
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl ModelConfig {
    /// Format to use for the configured location
    pub fn resolved_format(&self) -> Option<ModelFormat> {
        self.format
            .or_else(|| ModelFormat::from_extension(&self.location))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between logged summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl AppConfig {
    /// Load configuration layering defaults, an optional file and the environment.
    ///
    /// An explicitly given path must exist; the default path is optional.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let defaults = serde_json::to_string(&AppConfig::default())
            .context("Failed to serialize default configuration")?;

        let mut builder =
            Config::builder().add_source(File::from_str(&defaults, FileFormat::Json));

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_PATH).required(false)),
        };

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("model.feature_names")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that can never produce a working service
    pub fn validate(&self) -> Result<()> {
        if self.model.location.trim().is_empty() {
            anyhow::bail!("model.location must not be empty");
        }
        if self.server.workers == 0 {
            anyhow::bail!("server.workers must be at least 1");
        }
        if self.server.max_batch_size == 0 {
            anyhow::bail!("server.max_batch_size must be at least 1");
        }
        if self.model.onnx_threads == 0 {
            anyhow::bail!("model.onnx_threads must be at least 1");
        }
        if let (Some(features), Some(names)) = (self.model.features, &self.model.feature_names) {
            if features != names.len() {
                anyhow::bail!(
                    "model.features ({}) disagrees with model.feature_names ({} names)",
                    features,
                    names.len()
                );
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: 4,
                max_request_bytes: 1024 * 1024,
                max_batch_size: 256,
            },
            model: ModelConfig {
                location: "models/model.onnx".to_string(),
                format: None,
                features: None,
                feature_names: None,
                onnx_threads: default_onnx_threads(),
                fetch_timeout_secs: default_fetch_timeout_secs(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            metrics: MetricsConfig {
                report_interval_secs: 60,
            },
            training: None,
        }
    }
}
