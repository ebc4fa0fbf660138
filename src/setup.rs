//! Training data preparation and environment checks
//!
//! Everything here returns a report; the `statement-setup` binary decides how
//! to print it.

use crate::analysis::AnalysisResult;
use crate::config::PathsConfig;
use crate::error::Result;
use crate::llm::{api_key_from_env, API_KEY_VARS};
use crate::task::REQUIRED_TASK_FIELDS;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// Errors shown before the rest are summarized as "... and N more"
pub const MAX_LISTED_ERRORS: usize = 5;

/// Result of copying the example file into place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Target existed and the operator declined to overwrite
    Skipped,
    ExampleMissing,
}

/// Copy `example` to `target`, asking `confirm_overwrite` first if `target` exists
pub fn create_training_data<F>(example: &Path, target: &Path, confirm_overwrite: F) -> Result<CreateOutcome>
where
    F: FnOnce() -> bool,
{
    if target.exists() && !confirm_overwrite() {
        return Ok(CreateOutcome::Skipped);
    }

    if !example.exists() {
        return Ok(CreateOutcome::ExampleMissing);
    }

    let content = std::fs::read_to_string(example)?;
    std::fs::write(target, content)?;
    info!("Copied {} to {}", example.display(), target.display());
    Ok(CreateOutcome::Created)
}

/// A problem on one line of the data file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIssue {
    /// 1-based
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for LineIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

/// Qualitative advice on the number of valid examples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    TooFew,
    Few,
    Good,
    Excellent,
}

impl Recommendation {
    pub fn for_count(valid: usize) -> Self {
        match valid {
            0..=4 => Recommendation::TooFew,
            5..=9 => Recommendation::Few,
            10..=19 => Recommendation::Good,
            _ => Recommendation::Excellent,
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Recommendation::TooFew | Recommendation::Few)
    }

    pub fn message(&self) -> &'static str {
        match self {
            Recommendation::TooFew => "Less than 5 examples - add more for better results",
            Recommendation::Few => "Less than 10 examples - consider adding more",
            Recommendation::Good => "Good number of examples",
            Recommendation::Excellent => "Excellent number of examples!",
        }
    }
}

/// Structural check of a data file's contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid_count: usize,
    pub errors: Vec<LineIssue>,
    /// Valid lines whose expected output does not match the analysis schema
    pub schema_warnings: Vec<LineIssue>,
}

impl ValidationReport {
    /// The errors worth printing
    pub fn listed_errors(&self) -> &[LineIssue] {
        &self.errors[..self.errors.len().min(MAX_LISTED_ERRORS)]
    }

    /// How many errors `listed_errors` leaves out
    pub fn hidden_error_count(&self) -> usize {
        self.errors.len().saturating_sub(MAX_LISTED_ERRORS)
    }

    pub fn recommendation(&self) -> Recommendation {
        Recommendation::for_count(self.valid_count)
    }
}

/// Outcome of validating the data file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFileCheck {
    Missing,
    Empty,
    Checked(ValidationReport),
}

/// Validate the JSONL file at `path`
pub fn validate_training_data(path: &Path) -> Result<DataFileCheck> {
    if !path.exists() {
        return Ok(DataFileCheck::Missing);
    }

    let content = std::fs::read_to_string(path)?;
    if content.is_empty() {
        return Ok(DataFileCheck::Empty);
    }

    Ok(DataFileCheck::Checked(validate_lines(&content)))
}

/// Validate JSONL content line by line. Blank lines are ignored.
pub fn validate_lines(content: &str) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let data: Value = match serde_json::from_str(line) {
            Ok(data) => data,
            Err(e) => {
                report.errors.push(LineIssue {
                    line: line_no,
                    message: format!("Invalid JSON - {}", e),
                });
                continue;
            }
        };

        let Some(fields) = data.as_object() else {
            report.errors.push(LineIssue {
                line: line_no,
                message: "Expected a JSON object".to_string(),
            });
            continue;
        };

        let missing: Vec<&str> = REQUIRED_TASK_FIELDS
            .iter()
            .copied()
            .filter(|f| !fields.contains_key(*f))
            .collect();

        if !missing.is_empty() {
            report.errors.push(LineIssue {
                line: line_no,
                message: format!("Missing fields: {}", missing.join(", ")),
            });
            continue;
        }

        report.valid_count += 1;

        if let Err(e) = AnalysisResult::from_value(&fields["expected_output"]) {
            debug!(line = line_no, "expected_output schema mismatch: {}", e);
            report.schema_warnings.push(LineIssue {
                line: line_no,
                message: format!("expected_output does not match the analysis schema ({})", e),
            });
        }
    }

    report
}

/// Outcome of one environment check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvCheck {
    pub label: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl EnvCheck {
    fn new(label: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentReport {
    pub version: String,
    pub checks: Vec<EnvCheck>,
}

impl EnvironmentReport {
    pub fn all_ok(&self) -> bool {
        self.checks.iter().all(|c| c.status == CheckStatus::Ok)
    }
}

/// Check the prerequisites for a training run
pub fn check_environment(paths: &PathsConfig) -> EnvironmentReport {
    check_environment_with(paths, api_key_from_env())
}

/// Same as [`check_environment`] with an explicit API key lookup result
pub fn check_environment_with(paths: &PathsConfig, api_key: Option<String>) -> EnvironmentReport {
    let mut checks = Vec::new();

    checks.push(file_check("Training data", &paths.data_file, CheckStatus::Missing));
    checks.push(file_check("Example data", &paths.example_file, CheckStatus::Warning));

    checks.push(match crate::logging::preflight_log_dir(&paths.log_dir) {
        Ok(()) => EnvCheck::new(
            "Log directory",
            CheckStatus::Ok,
            format!("{} is writable", paths.log_dir.display()),
        ),
        Err(e) => EnvCheck::new(
            "Log directory",
            CheckStatus::Missing,
            format!("{} is not writable ({})", paths.log_dir.display(), e),
        ),
    });

    checks.push(match api_key {
        Some(key) => EnvCheck::new(
            "API key",
            CheckStatus::Ok,
            format!("OpenAI API key found (length: {})", key.len()),
        ),
        None => EnvCheck::new(
            "API key",
            CheckStatus::Warning,
            format!("OpenAI API key not found; set {}", API_KEY_VARS.join(" or ")),
        ),
    });

    checks.push(if paths.system_prompt_file.exists() {
        EnvCheck::new("System prompt", CheckStatus::Ok, "System prompt file found")
    } else {
        EnvCheck::new(
            "System prompt",
            CheckStatus::Warning,
            format!("System prompt not found at: {}", paths.system_prompt_file.display()),
        )
    });

    EnvironmentReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
    }
}

fn file_check(label: &str, path: &Path, when_absent: CheckStatus) -> EnvCheck {
    if path.is_file() {
        EnvCheck::new(label, CheckStatus::Ok, format!("{} found", path.display()))
    } else {
        EnvCheck::new(label, when_absent, format!("{} not found", path.display()))
    }
}
