use thiserror::Error;

/// Main error type for the training harness
#[derive(Error, Debug)]
pub enum TrainerError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("API key not configured (set OPENAI_API_KEY or VITE_OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("No response content from chat API")]
    EmptyResponse,

    // Rollout errors
    #[error("Agent invocation failed for {task_id}: {reason}")]
    Invocation { task_id: String, reason: String },

    // Data errors
    #[error("Malformed task on line {line}: {reason}")]
    TaskParse { line: usize, reason: String },

    #[error("No training data found in {0}")]
    NoTrainingData(String),

    #[error("System prompt not found at {0}")]
    MissingSystemPrompt(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TrainerError {
    /// Whether the error came from talking to the chat API
    pub fn is_invocation(&self) -> bool {
        matches!(
            self,
            TrainerError::Http(_)
                | TrainerError::Api { .. }
                | TrainerError::EmptyResponse
                | TrainerError::MissingApiKey
                | TrainerError::Invocation { .. }
        )
    }
}

/// Result type alias for TrainerError
pub type Result<T> = std::result::Result<T, TrainerError>;
