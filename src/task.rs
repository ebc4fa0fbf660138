//! Training tasks and the JSONL loader.

use crate::error::{Result, TrainerError};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// Keys every line of the training file must carry
pub const REQUIRED_TASK_FIELDS: [&str; 3] = ["statement_text", "borrower_info", "expected_output"];

const NOT_PROVIDED: &str = "Not Provided";

/// Borrower and business attributes attached to a statement.
///
/// Keys are kept verbatim; the accessors apply the fallbacks used when
/// building the prompt context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BorrowerInfo(#[serde(deserialize_with = "stringly_map")] BTreeMap<String, String>);

impl BorrowerInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn client_name(&self) -> &str {
        self.get("clientName").unwrap_or("")
    }

    pub fn business_name(&self) -> &str {
        self.get("businessName").unwrap_or("")
    }

    pub fn ownership_percentage(&self) -> &str {
        self.get("ownershipPercentage").unwrap_or(NOT_PROVIDED)
    }

    pub fn business_type(&self) -> &str {
        self.get("businessType").unwrap_or("")
    }

    pub fn num_employees(&self) -> &str {
        self.get("numEmployees").unwrap_or(NOT_PROVIDED)
    }

    pub fn business_description(&self) -> &str {
        self.get("businessDescription").unwrap_or(NOT_PROVIDED)
    }

    pub fn as_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or_default()
    }
}

/// Accept numbers and booleans in borrower info by stringifying them.
fn stringly_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct TaskLine {
    statement_text: String,
    borrower_info: BorrowerInfo,
    expected_output: serde_json::Map<String, serde_json::Value>,
}

/// One bank statement analysis example
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankStatementTask {
    pub task_id: String,
    pub statement_text: String,
    pub borrower_info: BorrowerInfo,
    /// Used only for scoring
    pub expected_output: serde_json::Value,
}

impl BankStatementTask {
    pub fn new(
        statement_text: impl Into<String>,
        borrower_info: BorrowerInfo,
        expected_output: serde_json::Value,
    ) -> Self {
        let statement_text = statement_text.into();
        Self {
            task_id: task_id_for(&statement_text),
            statement_text,
            borrower_info,
            expected_output,
        }
    }

    /// Parse a single JSONL line
    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        let parsed: TaskLine = serde_json::from_str(line)?;
        Ok(Self::new(
            parsed.statement_text,
            parsed.borrower_info,
            serde_json::Value::Object(parsed.expected_output),
        ))
    }

    /// A placeholder task for smoke runs
    pub fn sample() -> Self {
        Self::new(
            "Sample bank statement text...",
            BorrowerInfo::new()
                .with("clientName", "John Doe")
                .with("businessName", "Test LLC")
                .with("ownershipPercentage", "100")
                .with("businessType", "Retail")
                .with("numEmployees", "5")
                .with("businessDescription", "Test business"),
            serde_json::json!({}),
        )
    }
}

/// Stable id from the first 100 characters of the statement
fn task_id_for(statement_text: &str) -> String {
    let prefix: String = statement_text.chars().take(100).collect();
    let digest = Sha256::digest(prefix.as_bytes());
    format!("task_{}", &hex::encode(digest)[..16])
}

/// Load training tasks from a JSONL file.
///
/// A missing file yields an empty list. A malformed line is an error.
pub fn load_tasks<P: AsRef<Path>>(path: P) -> Result<Vec<BankStatementTask>> {
    let path = path.as_ref();

    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Training data file not found: {}", path.display());
            println!("Training data file not found: {}", path.display());
            println!("Please create a training_data.jsonl file with your training examples");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut tasks = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let task = BankStatementTask::from_json_line(&line).map_err(|e| TrainerError::TaskParse {
            line: idx + 1,
            reason: e.to_string(),
        })?;
        debug!(task_id = %task.task_id, line = idx + 1, "Loaded task");
        tasks.push(task);
    }

    info!("Loaded {} tasks from {}", tasks.len(), path.display());
    Ok(tasks)
}

/// Split tasks by index: the first `floor(ratio * n)` train, the rest validate.
pub fn split_train_val<T>(mut tasks: Vec<T>, ratio: f64) -> (Vec<T>, Vec<T>) {
    let ratio = ratio.clamp(0.0, 1.0);
    let train_len = ((tasks.len() as f64) * ratio).floor() as usize;
    let val = tasks.split_off(train_len.min(tasks.len()));
    (tasks, val)
}
