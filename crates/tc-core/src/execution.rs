//! Tool invocation history
//!
//! Every call made through a tracking executor is recorded here: who asked
//! (session of the chain run), which tool, how long it took and how it ended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{InvocationContext, ToolResult};

const OUTPUT_SUMMARY_LIMIT: usize = 1000;

/// Invocation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
}

/// Record of a single tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub tool_name: String,
    /// Session of the chain run that issued the call
    pub session_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    /// Output rendered as JSON, truncated
    pub output_summary: Option<String>,
    pub error: Option<String>,
}

impl ExecutionRecord {
    fn start(tool_name: &str, context: &InvocationContext) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool_name: tool_name.to_string(),
            session_id: context.session_id.clone(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            output_summary: None,
            error: None,
        }
    }

    fn close(&mut self, status: ExecutionStatus) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        self.status = status;
    }

    pub fn success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

fn summarize(value: &serde_json::Value) -> String {
    let rendered = value.to_string();
    if rendered.len() <= OUTPUT_SUMMARY_LIMIT {
        return rendered;
    }
    let mut cut = OUTPUT_SUMMARY_LIMIT;
    while !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... (truncated)", &rendered[..cut])
}

/// Aggregate invocation statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub timed_out_executions: u64,
    pub total_duration_ms: u64,
    pub executions_by_tool: HashMap<String, u64>,
    pub failures_by_tool: HashMap<String, u64>,
}

impl ExecutionStats {
    pub fn average_duration_ms(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.total_executions as f64
        }
    }

    /// Percentage of finished invocations that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.successful_executions as f64 / self.total_executions as f64 * 100.0
        }
    }

    fn record(&mut self, record: &ExecutionRecord) {
        self.total_executions += 1;
        self.total_duration_ms += record.duration_ms.unwrap_or(0);
        *self
            .executions_by_tool
            .entry(record.tool_name.clone())
            .or_insert(0) += 1;

        match record.status {
            ExecutionStatus::Completed => self.successful_executions += 1,
            ExecutionStatus::Running => {}
            ExecutionStatus::Failed | ExecutionStatus::TimedOut => {
                if record.status == ExecutionStatus::TimedOut {
                    self.timed_out_executions += 1;
                }
                self.failed_executions += 1;
                *self
                    .failures_by_tool
                    .entry(record.tool_name.clone())
                    .or_insert(0) += 1;
            }
        }
    }
}

/// Bounded history of tool invocations
#[derive(Clone)]
pub struct ExecutionTracker {
    records: Arc<RwLock<VecDeque<ExecutionRecord>>>,
    max_records: usize,
    stats: Arc<RwLock<ExecutionStats>>,
}

impl ExecutionTracker {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(VecDeque::with_capacity(max_records))),
            max_records: max_records.max(1),
            stats: Arc::new(RwLock::new(ExecutionStats::default())),
        }
    }

    /// Record the start of an invocation and return its record ID
    pub async fn start_execution(&self, tool_name: &str, context: &InvocationContext) -> String {
        let record = ExecutionRecord::start(tool_name, context);
        let id = record.id.clone();

        let mut records = self.records.write().await;
        if records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(record);

        tracing::debug!(execution_id = %id, tool = %tool_name, "Invocation started");
        id
    }

    /// Close an invocation with the tool's own result
    pub async fn finish_execution(&self, id: &str, result: &ToolResult) {
        self.close(id, |record| {
            if result.is_success {
                record.output_summary = Some(summarize(&result.data));
                ExecutionStatus::Completed
            } else {
                record.error = Some(result.error_message().unwrap_or("Failed").to_string());
                ExecutionStatus::Failed
            }
        })
        .await;
    }

    /// Close an invocation that never produced a result
    pub async fn fail_execution(&self, id: &str, error: &str) {
        self.close(id, |record| {
            record.error = Some(error.to_string());
            ExecutionStatus::Failed
        })
        .await;
    }

    pub async fn timeout_execution(&self, id: &str) {
        self.close(id, |record| {
            record.error = Some("Execution timed out".to_string());
            ExecutionStatus::TimedOut
        })
        .await;
    }

    async fn close<F>(&self, id: &str, update: F)
    where
        F: FnOnce(&mut ExecutionRecord) -> ExecutionStatus,
    {
        let mut records = self.records.write().await;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return;
        };
        let status = update(record);
        record.close(status);

        self.stats.write().await.record(record);

        tracing::debug!(
            execution_id = %id,
            tool = %record.tool_name,
            status = ?record.status,
            duration_ms = ?record.duration_ms,
            "Invocation finished"
        );
    }

    /// Most recent invocations, newest first
    pub async fn get_recent(&self, limit: usize) -> Vec<ExecutionRecord> {
        let records = self.records.read().await;
        records.iter().rev().take(limit).cloned().collect()
    }

    pub async fn get_execution(&self, id: &str) -> Option<ExecutionRecord> {
        let records = self.records.read().await;
        records.iter().find(|r| r.id == id).cloned()
    }

    /// Invocations of one tool, newest first
    pub async fn get_by_tool(&self, tool_name: &str, limit: usize) -> Vec<ExecutionRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .rev()
            .filter(|r| r.tool_name == tool_name)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Invocations issued by one chain run, oldest first
    pub async fn get_by_session(&self, session_id: &str) -> Vec<ExecutionRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect()
    }

    pub async fn get_stats(&self) -> ExecutionStats {
        self.stats.read().await.clone()
    }

    pub async fn get_active(&self) -> Vec<ExecutionRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .filter(|r| r.status == ExecutionStatus::Running)
            .cloned()
            .collect()
    }
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolError;
    use serde_json::json;

    #[tokio::test]
    async fn test_execution_tracking() {
        let tracker = ExecutionTracker::new(100);
        let ctx = InvocationContext::for_run("run-1");

        let id = tracker.start_execution("echo", &ctx).await;
        assert_eq!(tracker.get_active().await.len(), 1);

        tracker
            .finish_execution(&id, &ToolResult::success(json!({"msg": "hi"})))
            .await;

        let record = tracker.get_execution(&id).await.unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert!(record.success());
        assert_eq!(record.session_id, "run-1");
        assert_eq!(record.output_summary.as_deref(), Some(r#"{"msg":"hi"}"#));
        assert!(tracker.get_active().await.is_empty());
    }

    #[tokio::test]
    async fn test_tool_reported_failure() {
        let tracker = ExecutionTracker::new(100);
        let ctx = InvocationContext::for_run("run-1");

        let id = tracker.start_execution("fail", &ctx).await;
        tracker
            .finish_execution(&id, &ToolResult::failure(ToolError::new("nope")))
            .await;

        let record = tracker.get_execution(&id).await.unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn test_stats() {
        let tracker = ExecutionTracker::new(100);
        let ctx = InvocationContext::for_run("run-1");

        let r1 = tracker.start_execution("tool1", &ctx).await;
        tracker.finish_execution(&r1, &ToolResult::success(json!(1))).await;

        let r2 = tracker.start_execution("tool2", &ctx).await;
        tracker.fail_execution(&r2, "error").await;

        let r3 = tracker.start_execution("tool2", &ctx).await;
        tracker.timeout_execution(&r3).await;

        let stats = tracker.get_stats().await;
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.successful_executions, 1);
        assert_eq!(stats.failed_executions, 2);
        assert_eq!(stats.timed_out_executions, 1);
        assert_eq!(stats.failures_by_tool.get("tool2"), Some(&2));
        assert!((stats.success_rate() - 33.33).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let tracker = ExecutionTracker::new(2);
        let ctx = InvocationContext::for_run("run-1");

        let first = tracker.start_execution("a", &ctx).await;
        tracker.start_execution("b", &ctx).await;
        tracker.start_execution("c", &ctx).await;

        assert!(tracker.get_execution(&first).await.is_none());
        let recent: Vec<_> = tracker
            .get_recent(10)
            .await
            .into_iter()
            .map(|r| r.tool_name)
            .collect();
        assert_eq!(recent, vec!["c", "b"]);
    }

    #[test]
    fn test_summarize_truncates() {
        let long = json!("x".repeat(2000));
        let summary = summarize(&long);
        assert!(summary.ends_with("... (truncated)"));
        assert!(summary.len() < 1100);
    }
}
