//! `statement-analyze`: run the agent once against a single task.

use anyhow::Context;
use clap::Parser;
use statement_trainer::cli::AnalyzeCli;
use statement_trainer::config::AppConfig;
use statement_trainer::driver::DriverContext;
use statement_trainer::llm::OpenAiClient;
use statement_trainer::logging::init_logging_simple;
use statement_trainer::span::SpanRecorder;
use statement_trainer::task::{load_tasks, BankStatementTask};
use statement_trainer::BankStatementAgent;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging_simple();
    let cli = AnalyzeCli::parse();

    let config = AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("loading configuration from {}", cli.config_dir.display()))?;

    let task = pick_task(&cli, &config)?;
    println!("Analyzing task {}", task.task_id);

    let chat = OpenAiClient::from_llm_config(&config.llm)?;
    if !chat.is_configured() {
        anyhow::bail!("no API key found; set OPENAI_API_KEY");
    }

    let ctx = DriverContext::load(config)?;
    let agent = BankStatementAgent::new(Arc::new(chat), SpanRecorder::new(), ctx.system_prompt.clone());

    let rollout = agent.analyze(&task, agent.baseline_template()).await?;

    println!("{}", serde_json::to_string_pretty(&rollout.outcome.to_value())?);
    println!("\nReward: {:.4}", rollout.reward);

    Ok(())
}

fn pick_task(cli: &AnalyzeCli, config: &AppConfig) -> anyhow::Result<BankStatementTask> {
    let Some(index) = cli.index else {
        return Ok(BankStatementTask::sample());
    };

    let path = cli.data.as_ref().unwrap_or(&config.paths.data_file);
    let mut tasks = load_tasks(path)?;
    if index >= tasks.len() {
        anyhow::bail!("{} has {} tasks; index {} is out of range", path.display(), tasks.len(), index);
    }
    Ok(tasks.swap_remove(index))
}
