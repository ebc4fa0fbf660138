//! Rollout spans.
//!
//! Every agent call is wrapped in a span carrying its inputs, output and
//! reward. Finished spans land in a [`SpanRecorder`], which is how rewards
//! reach the optimization algorithm.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// A finished span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
    pub span_id: Uuid,
    pub name: String,
    pub span_type: String,
    pub task_id: String,
    pub inputs: Value,
    pub output: Option<Value>,
    pub reward: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Finished spans kept in memory by [`SpanRecorder::new`]
pub const DEFAULT_RETAINED_SPANS: usize = 1024;

#[derive(Debug)]
struct SpanBuffer {
    retained: VecDeque<SpanRecord>,
    capacity: usize,
    recorded: usize,
}

/// Shared sink for finished spans.
///
/// Only the most recent `capacity` spans are kept; [`SpanRecorder::recorded`]
/// counts every span ever finished.
#[derive(Debug, Clone)]
pub struct SpanRecorder {
    inner: Arc<Mutex<SpanBuffer>>,
}

impl Default for SpanRecorder {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETAINED_SPANS)
    }
}

impl SpanRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(SpanBuffer {
                retained: VecDeque::with_capacity(capacity.min(DEFAULT_RETAINED_SPANS)),
                capacity,
                recorded: 0,
            })),
        }
    }

    /// Open a span; it is recorded when finished or dropped
    pub fn begin(&self, name: &str, span_type: &str, task_id: &str, inputs: Value) -> ActiveSpan {
        ActiveSpan {
            recorder: self.clone(),
            record: Some(SpanRecord {
                span_id: Uuid::new_v4(),
                name: name.to_string(),
                span_type: span_type.to_string(),
                task_id: task_id.to_string(),
                inputs,
                output: None,
                reward: None,
                started_at: Utc::now(),
                ended_at: Utc::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SpanBuffer> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Span recorder lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn push(&self, record: SpanRecord) {
        let mut buffer = self.lock();
        if buffer.retained.len() == buffer.capacity {
            buffer.retained.pop_front();
        }
        buffer.retained.push_back(record);
        buffer.recorded += 1;
    }

    /// Copy of the retained spans, oldest first
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.lock().retained.iter().cloned().collect()
    }

    /// Number of retained spans
    pub fn len(&self) -> usize {
        self.lock().retained.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every span finished so far, including ones no longer retained
    pub fn recorded(&self) -> usize {
        self.lock().recorded
    }

    /// Rewards of retained spans belonging to `task_id`, in completion order
    pub fn rewards_for(&self, task_id: &str) -> Vec<f64> {
        self.lock()
            .retained
            .iter()
            .filter(|s| s.task_id == task_id)
            .filter_map(|s| s.reward)
            .collect()
    }
}

/// A span that is still open
#[derive(Debug)]
pub struct ActiveSpan {
    recorder: SpanRecorder,
    record: Option<SpanRecord>,
}

impl ActiveSpan {
    pub fn set_reward(&mut self, reward: f64) {
        if let Some(record) = self.record.as_mut() {
            record.reward = Some(reward);
        }
    }

    pub fn set_output(&mut self, output: Value) {
        if let Some(record) = self.record.as_mut() {
            record.output = Some(output);
        }
    }

    pub fn finish(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(mut record) = self.record.take() {
            record.ended_at = Utc::now();
            debug!(
                span = %record.name,
                task_id = %record.task_id,
                reward = ?record.reward,
                "Span finished"
            );
            self.recorder.push(record);
        }
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        self.close();
    }
}
