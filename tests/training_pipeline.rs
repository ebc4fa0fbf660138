//! End-to-end training runs against a scripted chat backend.

use async_trait::async_trait;
use serde_json::json;
use statement_trainer::llm::{ChatCompletion, ChatMessage};
use statement_trainer::{
    AppConfig, BankStatementAgent, DriverContext, Result, RunOutcome, SpanRecorder, Trainer,
    TrainerError, TrainingDriver, TrainingReport, PROMPT_TEMPLATE_KEY,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const COMPLETE: &str = r#"{"analysisSummary":{},"qualifiedIncomeCalculation":{"monthlyAverageNetDeposits":4200.0},"deposits":[{"amount":4200.0}],"timePeriodAggregates":{},"risk":[]}"#;

/// Answers by looking at the statement text inside the user message
#[derive(Default)]
struct ScriptedChat {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatCompletion for ScriptedChat {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = &messages[1].content;
        if prompt.contains("OFFLINE") {
            return Err(TrainerError::Api {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        if prompt.contains("GARBLED") {
            return Ok("I could not read this statement.".to_string());
        }
        Ok(COMPLETE.to_string())
    }

    fn model(&self) -> String {
        "scripted".to_string()
    }
}

fn workspace(statements: &[&str]) -> (PathBuf, AppConfig) {
    let dir = std::env::temp_dir().join(format!("stmt-pipeline-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();

    let content: String = statements
        .iter()
        .map(|text| {
            json!({
                "statement_text": text,
                "borrower_info": { "clientName": "Jane Roe", "numEmployees": 4 },
                "expected_output": {}
            })
            .to_string()
                + "\n"
        })
        .collect();
    std::fs::write(dir.join("training_data.jsonl"), content).unwrap();
    std::fs::write(dir.join("prompt.txt"), "Analyze the statement and answer in JSON.").unwrap();

    let mut config = AppConfig::load_from(dir.join("no-config")).unwrap();
    config.paths.data_file = dir.join("training_data.jsonl");
    config.paths.system_prompt_file = dir.join("prompt.txt");
    config.paths.report_file = dir.join("training_report.json");
    config.paths.log_dir = dir.clone();
    (dir, config)
}

#[tokio::test]
async fn mixed_outcomes_are_scored_and_reported() {
    let (dir, config) = workspace(&[
        "Statement A",
        "Statement B GARBLED",
        "Statement C OFFLINE",
        "Statement D",
        "Statement E",
    ]);
    let report_file = config.paths.report_file.clone();
    let chat = Arc::new(ScriptedChat::default());
    let driver = TrainingDriver::new(DriverContext::load(config).unwrap(), chat.clone());

    let report = match driver.run_until(std::future::pending()).await.unwrap() {
        RunOutcome::Completed(report) => report,
        other => panic!("unexpected outcome {:?}", other),
    };

    // 4 train / 1 val, every task attempted once
    assert_eq!(chat.calls.load(Ordering::SeqCst), 5);
    let train = report.train.as_ref().unwrap();
    assert_eq!(train.tasks, 4);
    assert_eq!(train.completed, 3);
    assert_eq!(train.parsed, 2);
    assert_eq!(train.failed, 1);
    // 1.0 + -1.0 (unparsed) + -1.0 (failed) + 1.0
    assert!(train.mean_reward.unwrap().abs() < 1e-9);
    assert_eq!(report.val.as_ref().unwrap().mean_reward, Some(1.0));

    // failed invocations still leave a span behind
    assert_eq!(report.span_count, 5);

    let saved: TrainingReport =
        serde_json::from_str(&std::fs::read_to_string(&report_file).unwrap()).unwrap();
    assert_eq!(saved.algorithm, "baseline");
    assert_eq!(saved.hyperparameters.val_batch_size, 5);
    assert_eq!(
        saved.resources[PROMPT_TEMPLATE_KEY],
        "Analyze the statement and answer in JSON."
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn trainer_rejects_empty_training_split() {
    let (dir, config) = workspace(&["only one"]);
    let ctx = DriverContext::load(config).unwrap();
    let trainer = Trainer::new(
        Box::new(statement_trainer::Baseline::new(5)),
        2,
        ctx.initial_resources(),
        ctx.config.apo.clone(),
    );
    let agent = BankStatementAgent::new(
        Arc::new(ScriptedChat::default()),
        trainer.spans().clone(),
        ctx.system_prompt.clone(),
    );

    let err = trainer.fit(Arc::new(agent), &[], &[]).await.unwrap_err();
    assert!(matches!(err, TrainerError::NoTrainingData(_)));
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn spans_capture_truncated_inputs_and_penalty() {
    let long_statement = format!("OFFLINE {}", "x".repeat(2_000));
    let (dir, config) = workspace(&[long_statement.as_str()]);
    let ctx = DriverContext::load(config).unwrap();
    let spans = SpanRecorder::new();
    let agent = BankStatementAgent::new(
        Arc::new(ScriptedChat::default()),
        spans.clone(),
        ctx.system_prompt.clone(),
    );

    let task = statement_trainer::load_tasks(&ctx.config.paths.data_file)
        .unwrap()
        .remove(0);
    let err = agent.analyze(&task, agent.baseline_template()).await.unwrap_err();
    assert!(err.is_invocation());

    let recorded = spans.spans();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].reward, Some(-1.0));
    let statement = recorded[0].inputs["statement_text"].as_str().unwrap();
    assert_eq!(statement.chars().count(), 500);
    assert_eq!(recorded[0].inputs["borrower_info"]["numEmployees"], "4");

    std::fs::remove_dir_all(&dir).ok();
}
