pub mod agent;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod llm;
pub mod logging;
pub mod reward;
pub mod setup;
pub mod span;
pub mod task;
pub mod trainer;

pub use agent::{AnalysisOutcome, BankStatementAgent, Rollout};
pub use config::{ApoConfig, AppConfig};
pub use driver::{DriverContext, RunOutcome, TrainingDriver};
pub use error::{Result, TrainerError};
pub use llm::{ChatCompletion, ChatConfig, ChatMessage, OpenAiClient};
pub use reward::calculate_reward;
pub use span::{SpanRecord, SpanRecorder};
pub use task::{load_tasks, split_train_val, BankStatementTask, BorrowerInfo};
pub use trainer::{
    Agent, Algorithm, Baseline, Resources, RolloutRunner, Trainer, TrainingReport,
    PROMPT_TEMPLATE_KEY,
};
