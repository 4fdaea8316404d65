//! Command-line interface.

use crate::config::{AppConfig, ModelFormat};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Serve predictions from a pre-trained model artifact.
#[derive(Parser, Debug)]
#[command(name = "predict-service")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults to config/config.toml when present)
    #[arg(short, long, env = "PREDICT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides logging.level
    #[arg(short, long, env = "PREDICT_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Load the model artifact and serve predictions (default)
    Serve {
        /// Model artifact location (path, file://, http:// or https://)
        #[arg(short, long)]
        model: Option<String>,

        /// Model artifact format; inferred from the extension when omitted
        #[arg(long, value_enum)]
        format: Option<ModelFormat>,

        /// Bind host
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate and print the declared training job as JSON
    TrainingJob,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Command to run; `serve` when none was given
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve {
            model: None,
            format: None,
            host: None,
            port: None,
        })
    }

    /// Apply command-line overrides on top of loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Commands::Serve {
            model,
            format,
            host,
            port,
        } = self.command()
        {
            if let Some(model) = model {
                config.model.location = model;
            }
            if format.is_some() {
                config.model.format = format;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli::try_parse_from(["predict-service"]).unwrap();
        assert!(matches!(cli.command(), Commands::Serve { model: None, .. }));
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::try_parse_from([
            "predict-service",
            "--log-level",
            "debug",
            "serve",
            "--model",
            "https://models.example.com/rule.bin",
            "--format",
            "linear",
            "--port",
            "9000",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.model.location, "https://models.example.com/rule.bin");
        assert_eq!(config.model.format, Some(ModelFormat::Linear));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_training_job_command() {
        let cli = Cli::try_parse_from(["predict-service", "training-job"]).unwrap();
        assert_eq!(cli.command(), Commands::TrainingJob);
    }
}
