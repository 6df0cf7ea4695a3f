use anyhow::{Context, Result};
use config_manager::SystemConfig;
use job_orchestrator::PipelineOrchestrator;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sales_tracker=debug".into()),
        )
        .init();

    info!("Starting sales ingestion pipeline...");

    // Optional first argument: path to the config file
    let config = match std::env::args().nth(1) {
        Some(path) => SystemConfig::load_from_path(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => SystemConfig::load().context("Failed to load configuration")?,
    };
    info!("Configuration loaded successfully");

    let orchestrator = PipelineOrchestrator::from_config(config)
        .await
        .context("Failed to initialize pipeline")?;

    let report = orchestrator.run().await.context("Pipeline run failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to render run report")?
    );

    match &report.cursor {
        Some(cursor) => match cursor.epoch_seconds {
            Some(seconds) => info!(
                "Next run: set pipeline.occurred_before = \"{}\" (earliest event {})",
                seconds, cursor.created_date
            ),
            None => info!("Earliest event {} has no parsable timestamp", cursor.created_date),
        },
        None => info!("No events stored; cursor unchanged"),
    }

    Ok(())
}
