//! Prediction service - main entry point
//!
//! Loads the configured model artifact and serves predictions over HTTP.

use anyhow::{Context, Result};
use chrono::Utc;
use predict_service::cli::{Cli, Commands};
use predict_service::{config::AppConfig, logging};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let mut config = AppConfig::load_from(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    logging::init(&config.logging)?;

    match cli.command() {
        Commands::Serve { .. } => {
            info!(
                model = %config.model.location,
                format = ?config.model.resolved_format(),
                bind = %config.server.bind_addr(),
                "Starting prediction service"
            );

            if let Err(e) = predict_service::run(config).await {
                error!(error = format!("{:#}", e), "Prediction service failed");
                return Err(e);
            }
        }

        Commands::TrainingJob => {
            let job = config
                .training
                .as_ref()
                .context("No [training] section in configuration")?;
            let document = job.render(Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }

    Ok(())
}
