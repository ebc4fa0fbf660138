use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub llm: LlmConfig,
    pub trainer: TrainerConfig,
    pub apo: ApoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Working training data (JSONL, one task per line)
    pub data_file: PathBuf,
    /// Example data copied into `data_file` by the setup menu
    pub example_file: PathBuf,
    /// Baseline prompt template, read once at startup
    pub system_prompt_file: PathBuf,
    /// Directory for the training log
    pub log_dir: PathBuf,
    /// Where the final training report is written
    pub report_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Ask the API for strict JSON-schema output
    #[serde(default)]
    pub structured_output: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainerConfig {
    /// Number of rollouts allowed in flight at once
    pub n_runners: usize,
    /// Fraction of tasks that go to the training split
    pub train_ratio: f64,
}

/// Beam-search hyperparameters handed to the optimization algorithm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApoConfig {
    /// Validation samples per evaluation
    pub val_batch_size: usize,
    /// Samples used to compute a textual gradient
    pub gradient_batch_size: usize,
    /// Prompt variants kept per round
    pub beam_width: usize,
    /// New variants generated per beam
    pub branch_factor: usize,
    /// Optimization rounds
    pub beam_rounds: usize,
}

impl Default for ApoConfig {
    fn default() -> Self {
        Self {
            val_batch_size: 5,
            gradient_batch_size: 3,
            beam_width: 3,
            branch_factor: 2,
            beam_rounds: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs in the log file
    #[serde(default)]
    pub json: bool,
    /// Log file name inside `paths.log_dir`
    #[serde(default = "default_log_file")]
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: default_log_file(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "training.log".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let apo = ApoConfig::default();

        let builder = Config::builder()
            .set_default("paths.data_file", "training_data.jsonl")?
            .set_default("paths.example_file", "training_data_example.jsonl")?
            .set_default(
                "paths.system_prompt_file",
                "../bank-statement-agent-lightning-training-system-prompt.txt",
            )?
            .set_default("paths.log_dir", ".")?
            .set_default("paths.report_file", "training_report.json")?
            .set_default("llm.base_url", "https://api.openai.com/v1")?
            .set_default("llm.model", "gpt-4o-mini")?
            .set_default("llm.temperature", 0.1)?
            .set_default("llm.timeout_secs", 120)?
            .set_default("llm.structured_output", false)?
            .set_default("trainer.n_runners", 4)?
            .set_default("trainer.train_ratio", 0.8)?
            .set_default("apo.val_batch_size", apo.val_batch_size as i64)?
            .set_default("apo.gradient_batch_size", apo.gradient_batch_size as i64)?
            .set_default("apo.beam_width", apo.beam_width as i64)?
            .set_default("apo.branch_factor", apo.branch_factor as i64)?
            .set_default("apo.beam_rounds", apo.beam_rounds as i64)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("logging.file", "training.log")?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("STMT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (STMT_LLM__MODEL, etc.)
            .add_source(
                Environment::with_prefix("STMT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Log file location derived from `paths.log_dir` and `logging.file`
    pub fn log_path(&self) -> PathBuf {
        self.paths.log_dir.join(&self.logging.file)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.trainer.n_runners == 0 {
            errors.push("trainer.n_runners must be at least 1".to_string());
        }

        if !(self.trainer.train_ratio > 0.0 && self.trainer.train_ratio <= 1.0) {
            errors.push(format!(
                "trainer.train_ratio must be in (0, 1], got {}",
                self.trainer.train_ratio
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            errors.push(format!(
                "llm.temperature must be between 0 and 2, got {}",
                self.llm.temperature
            ));
        }

        if self.llm.base_url.is_empty() {
            errors.push("llm.base_url cannot be empty".to_string());
        }

        let apo = &self.apo;
        if apo.val_batch_size == 0 || apo.gradient_batch_size == 0 {
            errors.push("apo batch sizes must be positive".to_string());
        }
        if apo.beam_width == 0 || apo.branch_factor == 0 || apo.beam_rounds == 0 {
            errors.push("apo beam_width, branch_factor and beam_rounds must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
