//! Bank statement analysis agent
//!
//! One rollout = one chat completion. The response is parsed as JSON and
//! scored; the reward and output are recorded on a span around the call.

use crate::error::{Result, TrainerError};
use crate::llm::{ChatCompletion, ChatMessage};
use crate::reward::{calculate_reward, ERROR_REWARD};
use crate::span::SpanRecorder;
use crate::task::BankStatementTask;
use crate::trainer::{Agent, Resources, PROMPT_TEMPLATE_KEY};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};

/// Fixed system role sent with every request
pub const SYSTEM_ROLE: &str =
    "You are a financial analysis assistant specializing in bank statement analysis.";

/// Lead-in placed between the template and the statement text
pub const STATEMENT_LEAD_IN: &str = "Here is the text extracted from the bank statements:";

/// Error tag for responses that were not valid JSON
pub const PARSE_ERROR: &str = "Failed to parse as JSON";

const SPAN_NAME: &str = "bank_statement_analysis";
const SPAN_INPUT_CHARS: usize = 500;

/// How the model's response was interpreted
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// The response was valid JSON
    Parsed(Value),
    /// The response was not JSON; the raw text is kept
    Unparsed { raw: String },
}

impl AnalysisOutcome {
    pub fn from_response(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => AnalysisOutcome::Parsed(value),
            Err(e) => {
                debug!("Response is not JSON: {}", e);
                AnalysisOutcome::Unparsed {
                    raw: text.to_string(),
                }
            }
        }
    }

    /// Mapping view used for scoring; unparsed output becomes an error wrapper
    pub fn to_value(&self) -> Value {
        match self {
            AnalysisOutcome::Parsed(value) => value.clone(),
            AnalysisOutcome::Unparsed { raw } => json!({
                "raw_output": raw,
                "error": PARSE_ERROR,
            }),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, AnalysisOutcome::Parsed(_))
    }
}

/// A completed rollout
#[derive(Debug, Clone, PartialEq)]
pub struct Rollout {
    pub task_id: String,
    pub outcome: AnalysisOutcome,
    pub reward: f64,
}

#[derive(Debug, Serialize)]
struct SpanInputs<'a> {
    statement_text: String,
    borrower_info: Value,
    model: &'a str,
}

/// Borrower context block prefixed to every prompt
pub fn borrower_context(task: &BankStatementTask) -> String {
    let info = &task.borrower_info;
    format!(
        "\n--- BORROWER AND BUSINESS CONTEXT ---\n\
         Client Name: {}\n\
         Business Name: {}\n\
         Ownership %: {}\n\
         Type of Business: {}\n\
         Number of Full Time Employees: {}\n\
         Business Description/Notes: {}\n\
         --- END OF CONTEXT ---\n",
        info.client_name(),
        info.business_name(),
        info.ownership_percentage(),
        info.business_type(),
        info.num_employees(),
        info.business_description(),
    )
}

/// Full user message: context, template, then the statement text
pub fn compose_prompt(task: &BankStatementTask, prompt_template: &str) -> String {
    format!(
        "{}\n\n{}\n\n{}\n\n{}",
        borrower_context(task),
        prompt_template,
        STATEMENT_LEAD_IN,
        task.statement_text
    )
}

/// Template to use for a rollout: the trainer's resource if set, else `default`
pub fn resolve_template<'a>(resources: &'a Resources, default: &'a str) -> &'a str {
    resources
        .get(PROMPT_TEMPLATE_KEY)
        .map(String::as_str)
        .unwrap_or(default)
}

/// The agent being optimized
pub struct BankStatementAgent {
    chat: Arc<dyn ChatCompletion>,
    spans: SpanRecorder,
    baseline_template: String,
}

impl BankStatementAgent {
    pub fn new(
        chat: Arc<dyn ChatCompletion>,
        spans: SpanRecorder,
        baseline_template: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            spans,
            baseline_template: baseline_template.into(),
        }
    }

    pub fn spans(&self) -> &SpanRecorder {
        &self.spans
    }

    pub fn baseline_template(&self) -> &str {
        &self.baseline_template
    }

    /// Run the analysis for one task with an explicit template.
    ///
    /// Non-JSON responses are scored, not raised. API failures record the
    /// error reward on the span and come back as [`TrainerError::Invocation`].
    pub async fn analyze(&self, task: &BankStatementTask, prompt_template: &str) -> Result<Rollout> {
        let model = self.chat.model();
        let tracing_span = info_span!("bank_statement_analysis", task_id = %task.task_id, model = %model);

        let messages = vec![
            ChatMessage::system(SYSTEM_ROLE),
            ChatMessage::user(compose_prompt(task, prompt_template)),
        ];
        let inputs = serde_json::to_value(SpanInputs {
            statement_text: task.statement_text.chars().take(SPAN_INPUT_CHARS).collect(),
            borrower_info: task.borrower_info.as_json(),
            model: &model,
        })?;

        async move {
            let mut span = self.spans.begin(SPAN_NAME, "agent", &task.task_id, inputs);

            match self.chat.complete(messages).await {
                Ok(text) => {
                    let outcome = AnalysisOutcome::from_response(&text);
                    let value = outcome.to_value();
                    let reward = calculate_reward(&value, &task.expected_output);
                    if !outcome.is_parsed() {
                        warn!(task_id = %task.task_id, "Model output was not valid JSON");
                    }
                    debug!(task_id = %task.task_id, reward, "Rollout scored");

                    span.set_reward(reward);
                    span.set_output(value);
                    span.finish();

                    Ok(Rollout {
                        task_id: task.task_id.clone(),
                        outcome,
                        reward,
                    })
                }
                Err(e) => {
                    warn!(task_id = %task.task_id, "Agent invocation failed: {}", e);
                    span.set_reward(ERROR_REWARD);
                    span.set_output(json!({ "error": e.to_string() }));
                    span.finish();

                    Err(TrainerError::Invocation {
                        task_id: task.task_id.clone(),
                        reason: e.to_string(),
                    })
                }
            }
        }
        .instrument(tracing_span)
        .await
    }
}

#[async_trait]
impl Agent for BankStatementAgent {
    async fn rollout(&self, task: &BankStatementTask, resources: &Resources) -> Result<Rollout> {
        let template = resolve_template(resources, &self.baseline_template);
        self.analyze(task, template).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockChatCompletion;
    use crate::task::BorrowerInfo;

    fn mock_returning(text: &'static str) -> MockChatCompletion {
        let mut chat = MockChatCompletion::new();
        chat.expect_model().return_const("gpt-4o-mini".to_string());
        chat.expect_complete()
            .times(1)
            .returning(move |_| Ok(text.to_string()));
        chat
    }

    fn task() -> BankStatementTask {
        BankStatementTask::new(
            "Date: 01/15/2024, Description: Deposit, Amount: $5,000.00",
            BorrowerInfo::new()
                .with("clientName", "John Doe")
                .with("businessName", "Doe Enterprises LLC"),
            json!({}),
        )
    }

    #[test]
    fn test_compose_prompt_order() {
        let prompt = compose_prompt(&task(), "TEMPLATE BODY");

        let context = prompt.find("--- BORROWER AND BUSINESS CONTEXT ---").unwrap();
        let template = prompt.find("TEMPLATE BODY").unwrap();
        let lead_in = prompt.find(STATEMENT_LEAD_IN).unwrap();
        let statement = prompt.find("Amount: $5,000.00").unwrap();

        assert!(context < template && template < lead_in && lead_in < statement);
        assert!(prompt.contains("Client Name: John Doe\n"));
        assert!(prompt.contains("Ownership %: Not Provided\n"));
        assert!(prompt.contains("Type of Business: \n"));
    }

    #[test]
    fn test_resolve_template_prefers_resource() {
        let mut resources = Resources::new();
        assert_eq!(resolve_template(&resources, "baseline"), "baseline");

        resources.insert(PROMPT_TEMPLATE_KEY.to_string(), "optimized".to_string());
        assert_eq!(resolve_template(&resources, "baseline"), "optimized");
    }

    #[test]
    fn test_outcome_wraps_non_json() {
        let outcome = AnalysisOutcome::from_response("not json at all");
        assert!(!outcome.is_parsed());
        assert_eq!(
            outcome.to_value(),
            json!({"raw_output": "not json at all", "error": PARSE_ERROR})
        );
    }

    #[tokio::test]
    async fn test_parsed_rollout_records_span() {
        let chat = mock_returning(
            r#"{"analysisSummary":{},"qualifiedIncomeCalculation":{"monthlyAverageNetDeposits":1},"deposits":[{}],"timePeriodAggregates":{},"risk":[]}"#,
        );
        let agent = BankStatementAgent::new(Arc::new(chat), SpanRecorder::new(), "baseline");

        let rollout = agent.analyze(&task(), "baseline").await.unwrap();
        assert!(rollout.outcome.is_parsed());
        assert_eq!(rollout.reward, 1.0);

        let spans = agent.spans().spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].reward, Some(1.0));
        assert_eq!(spans[0].task_id, rollout.task_id);
        assert_eq!(spans[0].inputs["borrower_info"]["clientName"], "John Doe");
    }

    #[tokio::test]
    async fn test_unparsed_rollout_scores_error() {
        let agent = BankStatementAgent::new(
            Arc::new(mock_returning("Sorry, I cannot help with that.")),
            SpanRecorder::new(),
            "baseline",
        );

        let rollout = agent.analyze(&task(), "baseline").await.unwrap();
        assert_eq!(
            rollout.outcome,
            AnalysisOutcome::Unparsed {
                raw: "Sorry, I cannot help with that.".to_string()
            }
        );
        assert_eq!(rollout.reward, -1.0);
    }

    #[tokio::test]
    async fn test_invocation_failure_records_penalty_and_propagates() {
        let mut chat = MockChatCompletion::new();
        chat.expect_model().return_const("gpt-4o-mini".to_string());
        chat.expect_complete().times(1).returning(|_| {
            Err(TrainerError::Api {
                status: 503,
                body: "unavailable".to_string(),
            })
        });
        let agent = BankStatementAgent::new(Arc::new(chat), SpanRecorder::new(), "baseline");

        let err = agent.analyze(&task(), "baseline").await.unwrap_err();
        assert!(matches!(err, TrainerError::Invocation { .. }));

        let spans = agent.spans().spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].reward, Some(-1.0));
        assert!(spans[0].output.as_ref().unwrap()["error"]
            .as_str()
            .unwrap()
            .contains("503"));
    }

    #[tokio::test]
    async fn test_rollout_uses_resource_template() {
        let mut chat = MockChatCompletion::new();
        chat.expect_model().return_const("gpt-4o-mini".to_string());
        chat.expect_complete()
            .withf(|messages| {
                messages.len() == 2
                    && messages[0].content == SYSTEM_ROLE
                    && messages[1].content.contains("OVERRIDDEN TEMPLATE")
                    && !messages[1].content.contains("BASELINE TEMPLATE")
            })
            .times(1)
            .returning(|_| Ok("{}".to_string()));
        let agent = BankStatementAgent::new(Arc::new(chat), SpanRecorder::new(), "BASELINE TEMPLATE");

        let mut resources = Resources::new();
        resources.insert(
            PROMPT_TEMPLATE_KEY.to_string(),
            "OVERRIDDEN TEMPLATE".to_string(),
        );
        let rollout = agent.rollout(&task(), &resources).await.unwrap();
        assert_eq!(rollout.reward, 0.0);
    }
}
