//! Training boundary
//!
//! The optimization algorithm plugs in through [`Algorithm`]; the agent being
//! optimized plugs in through [`Agent`]. The [`Trainer`] owns the shared
//! pieces between them: initial resources, the rollout runner and the span
//! sink that carries rewards back.

use crate::agent::Rollout;
use crate::config::ApoConfig;
use crate::error::{Result, TrainerError};
use crate::span::SpanRecorder;
use crate::task::BankStatementTask;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Resource key holding the prompt template under optimization
pub const PROMPT_TEMPLATE_KEY: &str = "prompt_template";

/// Named resources handed to every rollout
pub type Resources = BTreeMap<String, String>;

/// Something that can run one task against a set of resources
#[async_trait]
pub trait Agent: Send + Sync {
    async fn rollout(&self, task: &BankStatementTask, resources: &Resources) -> Result<Rollout>;
}

/// A rollout that raised instead of producing an output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutFailure {
    pub task_id: String,
    pub reason: String,
}

/// Results of running one batch of tasks
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub rollouts: Vec<Rollout>,
    pub failures: Vec<RolloutFailure>,
}

impl BatchResult {
    pub fn extend(&mut self, other: BatchResult) {
        self.rollouts.extend(other.rollouts);
        self.failures.extend(other.failures);
    }

    pub fn len(&self) -> usize {
        self.rollouts.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mean reward, with failed rollouts counted at -1.0
    pub fn mean_reward(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let total: f64 = self.rollouts.iter().map(|r| r.reward).sum::<f64>()
            + self.failures.len() as f64 * crate::reward::ERROR_REWARD;
        Some(total / self.len() as f64)
    }

    pub fn stats(&self) -> SplitStats {
        SplitStats {
            tasks: self.len(),
            completed: self.rollouts.len(),
            parsed: self.rollouts.iter().filter(|r| r.outcome.is_parsed()).count(),
            failed: self.failures.len(),
            mean_reward: self.mean_reward(),
        }
    }
}

/// Summary of one split's rollouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitStats {
    pub tasks: usize,
    pub completed: usize,
    pub parsed: usize,
    pub failed: usize,
    pub mean_reward: Option<f64>,
}

/// Runs batches of rollouts with at most `n_runners` in flight
#[derive(Clone)]
pub struct RolloutRunner {
    agent: Arc<dyn Agent>,
    n_runners: usize,
}

impl RolloutRunner {
    pub fn new(agent: Arc<dyn Agent>, n_runners: usize) -> Self {
        Self {
            agent,
            n_runners: n_runners.max(1),
        }
    }

    pub fn n_runners(&self) -> usize {
        self.n_runners
    }

    /// Run every task once. Failures are collected, not raised.
    pub async fn run_batch(&self, tasks: &[BankStatementTask], resources: &Resources) -> BatchResult {
        let rollouts: Vec<BoxFuture<'_, (String, Result<Rollout>)>> = tasks
            .iter()
            .map(|task| {
                let agent = Arc::clone(&self.agent);
                Box::pin(async move { (task.task_id.clone(), agent.rollout(task, resources).await) })
                    as BoxFuture<'_, _>
            })
            .collect();

        let results = stream::iter(rollouts)
            .buffer_unordered(self.n_runners)
            .collect::<Vec<_>>()
            .await;

        let mut batch = BatchResult::default();
        for (task_id, result) in results {
            match result {
                Ok(rollout) => batch.rollouts.push(rollout),
                Err(e) => {
                    warn!(task_id = %task_id, "Rollout failed: {}", e);
                    batch.failures.push(RolloutFailure {
                        task_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        batch
    }
}

/// What an algorithm hands back at the end of a run
#[derive(Debug, Clone)]
pub struct AlgorithmOutput {
    /// Best resources found (the prompt template, for APO)
    pub best_resources: Resources,
    pub train: Option<SplitStats>,
    pub val: Option<SplitStats>,
}

/// Optimization algorithm plugged into the trainer
#[async_trait]
pub trait Algorithm: Send + Sync {
    fn name(&self) -> &str;

    /// True when the algorithm only scores the initial resources
    fn is_evaluation_only(&self) -> bool {
        false
    }

    async fn run(
        &self,
        runner: &RolloutRunner,
        train: &[BankStatementTask],
        val: &[BankStatementTask],
        initial_resources: Resources,
    ) -> Result<AlgorithmOutput>;
}

/// Evaluation-only algorithm: scores the initial resources on both splits.
///
/// Useful as a dry run before handing the same setup to a real optimizer.
pub struct Baseline {
    val_batch_size: usize,
}

impl Baseline {
    pub fn new(val_batch_size: usize) -> Self {
        Self {
            val_batch_size: val_batch_size.max(1),
        }
    }

    pub fn from_apo(apo: &ApoConfig) -> Self {
        Self::new(apo.val_batch_size)
    }
}

#[async_trait]
impl Algorithm for Baseline {
    fn name(&self) -> &str {
        "baseline"
    }

    fn is_evaluation_only(&self) -> bool {
        true
    }

    async fn run(
        &self,
        runner: &RolloutRunner,
        train: &[BankStatementTask],
        val: &[BankStatementTask],
        initial_resources: Resources,
    ) -> Result<AlgorithmOutput> {
        info!("Baseline: evaluating {} training tasks", train.len());
        let train_batch = runner.run_batch(train, &initial_resources).await;
        let train_stats = train_batch.stats();
        info!(
            "Baseline train: {}/{} completed, mean reward {:?}",
            train_stats.completed, train_stats.tasks, train_stats.mean_reward
        );

        let mut val_batch = BatchResult::default();
        for (round, chunk) in val.chunks(self.val_batch_size).enumerate() {
            let batch = runner.run_batch(chunk, &initial_resources).await;
            info!(
                "Baseline validation batch {}: {} tasks, mean reward {:?}",
                round + 1,
                batch.len(),
                batch.mean_reward()
            );
            val_batch.extend(batch);
        }

        Ok(AlgorithmOutput {
            best_resources: initial_resources,
            train: (!train_batch.is_empty()).then_some(train_stats),
            val: (!val_batch.is_empty()).then(|| val_batch.stats()),
        })
    }
}

/// Persistable summary of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub algorithm: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub n_runners: usize,
    pub hyperparameters: ApoConfig,
    pub resources: Resources,
    pub train: Option<SplitStats>,
    pub val: Option<SplitStats>,
    pub span_count: usize,
}

impl TrainingReport {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Ties an algorithm, the rollout runner and the span sink together
pub struct Trainer {
    algorithm: Box<dyn Algorithm>,
    n_runners: usize,
    initial_resources: Resources,
    hyperparameters: ApoConfig,
    spans: SpanRecorder,
}

impl Trainer {
    pub fn new(
        algorithm: Box<dyn Algorithm>,
        n_runners: usize,
        initial_resources: Resources,
        hyperparameters: ApoConfig,
    ) -> Self {
        Self {
            algorithm,
            n_runners,
            initial_resources,
            hyperparameters,
            spans: SpanRecorder::new(),
        }
    }

    /// Span sink the agent should record into
    pub fn spans(&self) -> &SpanRecorder {
        &self.spans
    }

    pub fn initial_resources(&self) -> &Resources {
        &self.initial_resources
    }

    pub fn algorithm_name(&self) -> &str {
        self.algorithm.name()
    }

    pub fn is_evaluation_only(&self) -> bool {
        self.algorithm.is_evaluation_only()
    }

    pub fn n_runners(&self) -> usize {
        self.n_runners.max(1)
    }

    pub async fn fit(
        &self,
        agent: Arc<dyn Agent>,
        train: &[BankStatementTask],
        val: &[BankStatementTask],
    ) -> Result<TrainingReport> {
        if train.is_empty() {
            return Err(TrainerError::NoTrainingData("training split".to_string()));
        }

        let started_at = Utc::now();
        info!(
            algorithm = self.algorithm.name(),
            n_runners = self.n_runners,
            train = train.len(),
            val = val.len(),
            "Starting fit"
        );

        let runner = RolloutRunner::new(agent, self.n_runners);
        let output = self
            .algorithm
            .run(&runner, train, val, self.initial_resources.clone())
            .await?;

        let report = TrainingReport {
            algorithm: self.algorithm.name().to_string(),
            started_at,
            finished_at: Utc::now(),
            n_runners: runner.n_runners(),
            hyperparameters: self.hyperparameters.clone(),
            resources: output.best_resources,
            train: output.train,
            val: output.val,
            span_count: self.spans.recorded(),
        };
        info!(spans = report.span_count, "Fit finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AnalysisOutcome;
    use crate::task::BorrowerInfo;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Agent that fails on statements containing "fail" and tracks concurrency
    #[derive(Default)]
    struct CountingAgent {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Agent for CountingAgent {
        async fn rollout(&self, task: &BankStatementTask, resources: &Resources) -> Result<Rollout> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if task.statement_text.contains("fail") {
                return Err(TrainerError::Invocation {
                    task_id: task.task_id.clone(),
                    reason: "boom".to_string(),
                });
            }
            let template = resources.get(PROMPT_TEMPLATE_KEY).cloned().unwrap_or_default();
            Ok(Rollout {
                task_id: task.task_id.clone(),
                outcome: AnalysisOutcome::Parsed(serde_json::json!({ "template": template })),
                reward: 0.5,
            })
        }
    }

    fn tasks(texts: &[&str]) -> Vec<BankStatementTask> {
        texts
            .iter()
            .map(|t| BankStatementTask::new(*t, BorrowerInfo::new(), serde_json::json!({})))
            .collect()
    }

    fn resources() -> Resources {
        let mut r = Resources::new();
        r.insert(PROMPT_TEMPLATE_KEY.to_string(), "baseline".to_string());
        r
    }

    #[tokio::test]
    async fn test_baseline_runs_on_spawned_task() {
        let runner = RolloutRunner::new(Arc::new(CountingAgent::default()), 2);
        let train = tasks(&["a", "b", "c"]);
        let val = tasks(&["v"]);

        let handle = tokio::spawn(async move {
            let algorithm: Box<dyn Algorithm> = Box::new(Baseline::new(5));
            algorithm.run(&runner, &train, &val, resources()).await
        });

        let output = handle.await.unwrap().unwrap();
        assert_eq!(output.train.unwrap().tasks, 3);
        assert_eq!(output.val.unwrap().tasks, 1);
    }

    #[tokio::test]
    async fn test_runner_bounds_concurrency() {
        let agent = Arc::new(CountingAgent::default());
        let runner = RolloutRunner::new(agent.clone(), 3);
        let batch_tasks = tasks(&["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]);

        let batch = runner.run_batch(&batch_tasks, &resources()).await;

        assert_eq!(batch.rollouts.len(), 10);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 10);
        assert!(agent.peak.load(Ordering::SeqCst) <= 3);
        assert!(agent.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_failures_count_as_penalty() {
        let runner = RolloutRunner::new(Arc::new(CountingAgent::default()), 4);
        let batch = runner
            .run_batch(&tasks(&["ok one", "please fail", "ok two", "fail again"]), &resources())
            .await;

        let stats = batch.stats();
        assert_eq!(stats.tasks, 4);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.parsed, 2);
        // (0.5 + 0.5 - 1 - 1) / 4
        assert_eq!(stats.mean_reward, Some(-0.25));
    }

    #[test]
    fn test_empty_batch_has_no_mean() {
        assert_eq!(BatchResult::default().mean_reward(), None);
    }

    #[tokio::test]
    async fn test_baseline_evaluates_both_splits() {
        let agent = Arc::new(CountingAgent::default());
        let trainer = Trainer::new(
            Box::new(Baseline::new(2)),
            4,
            resources(),
            ApoConfig::default(),
        );

        let all = tasks(&["a", "b", "c", "d", "e"]);
        let report = trainer.fit(agent.clone(), &all[..4], &all[4..]).await.unwrap();

        assert_eq!(report.algorithm, "baseline");
        assert_eq!(report.n_runners, 4);
        assert_eq!(report.resources, resources());
        assert_eq!(report.train.as_ref().unwrap().tasks, 4);
        assert_eq!(report.val.as_ref().unwrap().tasks, 1);
        assert_eq!(report.hyperparameters, ApoConfig::default());
        assert_eq!(agent.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_fit_rejects_empty_training_split() {
        let trainer = Trainer::new(Box::new(Baseline::new(5)), 4, resources(), ApoConfig::default());
        let err = trainer
            .fit(Arc::new(CountingAgent::default()), &[], &tasks(&["v"]))
            .await
            .unwrap_err();
        assert!(matches!(err, TrainerError::NoTrainingData(_)));
    }

    #[test]
    fn test_report_saves_as_json() {
        let trainer = Trainer::new(Box::new(Baseline::new(5)), 2, resources(), ApoConfig::default());
        let report = tokio_test::assert_ok!(tokio_test::block_on(trainer.fit(
            Arc::new(CountingAgent::default()),
            &tasks(&["a"]),
            &[]
        )));
        assert!(report.val.is_none());

        let path = std::env::temp_dir().join(format!("report-{}.json", uuid::Uuid::new_v4()));
        tokio_test::assert_ok!(report.save(&path));
        let saved: TrainingReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.resources[PROMPT_TEMPLATE_KEY], "baseline");
        assert_eq!(saved.hyperparameters.beam_width, 3);

        std::fs::remove_file(&path).ok();
    }
}
