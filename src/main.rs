use anyhow::Context;
use clap::Parser;
use statement_trainer::cli::TrainCli;
use statement_trainer::config::AppConfig;
use statement_trainer::driver::{DriverContext, RunOutcome, TrainingDriver};
use statement_trainer::llm::OpenAiClient;
use statement_trainer::logging::init_logging;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = TrainCli::parse();

    let config = AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("loading configuration from {}", cli.config_dir.display()))?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("config: {e}");
        }
        anyhow::bail!("invalid configuration ({} problems)", errors.len());
    }

    println!("\nInitializing training environment...");
    let log_guard = init_logging(&config.logging, &config.paths.log_dir);
    if let Some(path) = log_guard.file() {
        info!("Writing training log to {}", path.display());
    }

    let chat = OpenAiClient::from_llm_config(&config.llm)?;
    if !chat.is_configured() {
        warn!("No API key found; every rollout will fail until OPENAI_API_KEY is set");
    }

    let ctx = DriverContext::load(config)?;
    let driver = TrainingDriver::new(ctx, Arc::new(chat));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match driver.run_until(shutdown).await? {
        RunOutcome::Completed(report) => {
            info!(algorithm = %report.algorithm, spans = report.span_count, "Training run finished")
        }
        RunOutcome::Interrupted => info!("Training run interrupted"),
        RunOutcome::NoTrainingSplit => info!("Nothing to train on"),
        RunOutcome::Failed(e) => info!("Training run failed: {}", e),
    }

    Ok(())
}
