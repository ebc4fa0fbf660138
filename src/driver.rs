//! Training run orchestration
//!
//! Loads the data, splits it, configures the trainer and narrates progress on
//! stdout. Everything the run needs is passed in through [`DriverContext`].

use crate::agent::BankStatementAgent;
use crate::config::AppConfig;
use crate::error::{Result, TrainerError};
use crate::llm::ChatCompletion;
use crate::task::{load_tasks, split_train_val, BankStatementTask};
use crate::trainer::{Baseline, Resources, Trainer, TrainingReport, PROMPT_TEMPLATE_KEY};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

const RULE: &str = "================================================================================";

const EXAMPLE_FORMAT: &str = r#"
{
  "statement_text": "Bank: ABC Bank\nAccount ending in 1234\nDate: 01/15/2024, Description: Deposit, Amount: $5,000.00\n...",
  "borrower_info": {
    "clientName": "John Doe",
    "businessName": "Doe Enterprises LLC",
    "ownershipPercentage": "75",
    "businessType": "Professional Services",
    "numEmployees": "3",
    "businessDescription": "Consulting services"
  },
  "expected_output": {
    "analysisSummary": {...},
    "qualifiedIncomeCalculation": {...},
    "deposits": [...],
    "timePeriodAggregates": {...},
    "risk": [...]
  }
}
"#;

/// Configuration plus the baseline prompt, loaded once at startup
#[derive(Debug, Clone)]
pub struct DriverContext {
    pub config: AppConfig,
    pub system_prompt: String,
}

impl DriverContext {
    /// Read the system prompt named in `config`
    pub fn load(config: AppConfig) -> Result<Self> {
        let path = &config.paths.system_prompt_file;
        let system_prompt = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TrainerError::MissingSystemPrompt(path.display().to_string())
            } else {
                TrainerError::Io(e)
            }
        })?;
        info!("Loaded system prompt ({} chars) from {}", system_prompt.len(), path.display());
        Ok(Self {
            config,
            system_prompt,
        })
    }

    pub fn initial_resources(&self) -> Resources {
        let mut resources = Resources::new();
        resources.insert(PROMPT_TEMPLATE_KEY.to_string(), self.system_prompt.clone());
        resources
    }
}

/// How a training run ended
#[derive(Debug)]
pub enum RunOutcome {
    Completed(TrainingReport),
    /// Data loaded but the training split came out empty
    NoTrainingSplit,
    Interrupted,
    /// The run raised; the error has already been printed
    Failed(TrainerError),
}

pub struct TrainingDriver {
    ctx: DriverContext,
    chat: Arc<dyn ChatCompletion>,
}

impl TrainingDriver {
    pub fn new(ctx: DriverContext, chat: Arc<dyn ChatCompletion>) -> Self {
        Self { ctx, chat }
    }

    /// Load every task and split it into training and validation sets
    pub fn load_datasets(&self) -> Result<(Vec<BankStatementTask>, Vec<BankStatementTask>)> {
        let data_file = &self.ctx.config.paths.data_file;
        let tasks = load_tasks(data_file)?;

        if tasks.is_empty() {
            println!("ERROR: No training data found!");
            println!("Please create a training_data.jsonl file with your training examples.");
            println!("\nExample format:");
            println!("{}", EXAMPLE_FORMAT);
            return Err(TrainerError::NoTrainingData(data_file.display().to_string()));
        }

        let (train, val) = split_train_val(tasks, self.ctx.config.trainer.train_ratio);
        println!(
            "Loaded {} training examples and {} validation examples",
            train.len(),
            val.len()
        );
        info!(train = train.len(), val = val.len(), "Datasets ready");
        Ok((train, val))
    }

    pub fn build_trainer(&self) -> Trainer {
        let apo = &self.ctx.config.apo;
        Trainer::new(
            Box::new(Baseline::from_apo(apo)),
            self.ctx.config.trainer.n_runners,
            self.ctx.initial_resources(),
            apo.clone(),
        )
    }

    fn configuration_lines(&self, trainer: &Trainer) -> Vec<String> {
        let apo = &self.ctx.config.apo;
        let mut lines = vec![format!("\nConfiguring algorithm: {}", trainer.algorithm_name())];
        if trainer.is_evaluation_only() {
            lines.push(
                "  - Evaluation only: the baseline prompt is scored, not rewritten".to_string(),
            );
            lines.push("  - Beam search settings (recorded in the report for an external optimizer):".to_string());
        }
        lines.push(format!("  - Beam width: {} (number of prompt variants to maintain)", apo.beam_width));
        lines.push(format!("  - Branch factor: {} (new variants per beam)", apo.branch_factor));
        lines.push(format!("  - Beam rounds: {} (optimization iterations)", apo.beam_rounds));
        lines.push(format!("  - Validation batch size: {}", apo.val_batch_size));
        lines.push(format!("  - Gradient batch size: {}", apo.gradient_batch_size));
        lines.push("\nConfiguring trainer...".to_string());
        lines.push(format!("  - Runners: {} (parallel rollouts)", trainer.n_runners()));
        lines.push("  - Using baseline prompt from system prompt file".to_string());
        lines
    }

    /// Run training until completion or until `shutdown` resolves.
    ///
    /// Only startup failures (no data) come back as `Err`; everything after
    /// that is reported on stdout and folded into [`RunOutcome`].
    pub async fn run_until<S>(&self, shutdown: S) -> Result<RunOutcome>
    where
        S: Future<Output = ()>,
    {
        println!("{}", RULE);
        println!("Bank Statement Analysis Agent - Training");
        println!("{}", RULE);

        let trainer = self.build_trainer();
        for line in self.configuration_lines(&trainer) {
            println!("{}", line);
        }

        println!("\nLoading datasets...");
        let (train, val) = self.load_datasets()?;

        if train.is_empty() {
            println!("ERROR: No training data available. Exiting...");
            return Ok(RunOutcome::NoTrainingSplit);
        }

        let log_file = self.ctx.config.log_path();
        println!("\n{}", RULE);
        println!("STARTING TRAINING");
        println!("{}", RULE);
        println!("\nThis will:");
        for step in plan_steps(trainer.is_evaluation_only()) {
            println!("  {}", step);
        }
        println!("\nTraining progress will be logged to '{}'", log_file.display());
        println!("Press Ctrl+C to stop training early\n");

        let agent = Arc::new(BankStatementAgent::new(
            Arc::clone(&self.chat),
            trainer.spans().clone(),
            self.ctx.system_prompt.clone(),
        ));

        let result = tokio::select! {
            biased;
            _ = shutdown => {
                warn!("Training interrupted");
                println!("\n\nTraining interrupted by user.");
                println!("Partial results may be available in {}", log_file.display());
                return Ok(RunOutcome::Interrupted);
            }
            result = trainer.fit(agent, &train, &val) => result,
        };

        match result {
            Ok(report) => {
                let report_file = &self.ctx.config.paths.report_file;
                if let Err(e) = report.save(report_file) {
                    warn!("Could not write training report: {}", e);
                }

                let lines = completion_lines(
                    &report,
                    trainer.is_evaluation_only(),
                    report_file,
                    &log_file,
                );
                for line in lines {
                    println!("{}", line);
                }

                Ok(RunOutcome::Completed(report))
            }
            Err(e) => {
                error!("Training failed: {}", e);
                println!("\n\nERROR during training: {}", e);
                println!("{:?}", e);
                let mut source = std::error::Error::source(&e);
                while let Some(cause) = source {
                    println!("  caused by: {}", cause);
                    source = cause.source();
                }
                Ok(RunOutcome::Failed(e))
            }
        }
    }
}

fn plan_steps(evaluation_only: bool) -> &'static [&'static str] {
    if evaluation_only {
        &[
            "1. Run the agent on every training example with the baseline prompt",
            "2. Calculate rewards based on output quality",
            "3. Score the same prompt on held-out examples",
        ]
    } else {
        &[
            "1. Run the agent on training examples with different prompt variations",
            "2. Calculate rewards based on output quality",
            "3. Optimize the system prompt to maximize rewards",
            "4. Validate on held-out examples",
        ]
    }
}

fn completion_lines(
    report: &TrainingReport,
    evaluation_only: bool,
    report_file: &Path,
    log_file: &Path,
) -> Vec<String> {
    let title = if evaluation_only {
        "BASELINE EVALUATION COMPLETED"
    } else {
        "TRAINING COMPLETED SUCCESSFULLY"
    };
    let mut lines = vec![format!("\n{}", RULE), title.to_string(), RULE.to_string()];

    if let Some(stats) = &report.train {
        lines.push(format!("\nTraining mean reward: {}", format_reward(stats.mean_reward)));
    }
    if let Some(stats) = &report.val {
        lines.push(format!("Validation mean reward: {}", format_reward(stats.mean_reward)));
    }

    if evaluation_only {
        lines.push(format!(
            "\nEvaluation report for algorithm '{}' saved to {}; the prompt template is unchanged.",
            report.algorithm,
            report_file.display()
        ));
        lines.push(format!("Check the {} file for per-rollout details.", log_file.display()));
        lines.push("\nNext steps:".to_string());
        lines.push("  1. Compare these rewards against an optimized run".to_string());
        lines.push("  2. Add training examples where rewards are low".to_string());
    } else {
        lines.push(format!("\nOptimized prompts have been saved to {}.", report_file.display()));
        lines.push(format!("Check the {} file for detailed results.", log_file.display()));
        lines.push("\nNext steps:".to_string());
        lines.push("  1. Review the optimized prompts in the output".to_string());
        lines.push("  2. Test the optimized prompts with real data".to_string());
        lines.push("  3. Integrate the best prompt back into your application".to_string());
    }
    lines
}

fn format_reward(reward: Option<f64>) -> String {
    reward
        .map(|r| format!("{:.3}", r))
        .unwrap_or_else(|| "n/a".to_string())
}
