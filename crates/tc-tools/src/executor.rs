//! Registry-backed tool executor with timeout and concurrency control

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tc_core::config::get_config_int;
use tc_core::{
    CancellationToken, Error, ExecutionTracker, InvocationContext, Parameters, ToolError,
    ToolExecutor, ToolResult,
};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::ToolRegistry;

/// Key in `InvocationContext::custom` overriding the per-call timeout
pub const TIMEOUT_OVERRIDE_KEY: &str = "timeout_ms";

/// Configuration for tool execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum concurrent tool executions
    pub max_concurrent: usize,
    /// Default timeout for tool execution (ms)
    pub default_timeout_ms: u64,
    /// Maximum timeout allowed (ms)
    pub max_timeout_ms: u64,
    /// Invocation records kept in history
    pub history_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            default_timeout_ms: 30000,
            max_timeout_ms: 300000, // 5 minutes
            history_size: 1000,
        }
    }
}

impl ExecutorConfig {
    /// Read `TC_EXECUTOR_*` variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |key: &str, default: usize| {
            usize::try_from(get_config_int(key, default as i64)).unwrap_or(default)
        };
        Self {
            max_concurrent: read("TC_EXECUTOR_MAX_CONCURRENT", defaults.max_concurrent).max(1),
            default_timeout_ms: read(
                "TC_EXECUTOR_DEFAULT_TIMEOUT_MS",
                defaults.default_timeout_ms as usize,
            ) as u64,
            max_timeout_ms: read("TC_EXECUTOR_MAX_TIMEOUT_MS", defaults.max_timeout_ms as usize)
                as u64,
            history_size: read("TC_EXECUTOR_HISTORY_SIZE", defaults.history_size),
        }
    }
}

/// Runs registered tools with concurrency and timeout control, recording
/// every invocation in an `ExecutionTracker`.
#[derive(Clone)]
pub struct RegistryExecutor {
    registry: Arc<ToolRegistry>,
    config: ExecutorConfig,
    semaphore: Arc<Semaphore>,
    tracker: ExecutionTracker,
}

impl RegistryExecutor {
    pub fn new(registry: Arc<ToolRegistry>, config: ExecutorConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        let tracker = ExecutionTracker::new(config.history_size);
        Self {
            registry,
            config,
            semaphore,
            tracker,
        }
    }

    pub fn with_defaults(registry: Arc<ToolRegistry>) -> Self {
        Self::new(registry, ExecutorConfig::default())
    }

    fn timeout_for(&self, context: &InvocationContext) -> Duration {
        let requested = context
            .custom
            .get(TIMEOUT_OVERRIDE_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(self.config.default_timeout_ms);
        Duration::from_millis(requested.min(self.config.max_timeout_ms))
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }
}

#[async_trait]
impl ToolExecutor for RegistryExecutor {
    async fn execute_tool(
        &self,
        tool_id: &str,
        parameters: Parameters,
        context: &InvocationContext,
        cancel: &CancellationToken,
    ) -> tc_core::Result<ToolResult> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled(format!("tool '{}' not started", tool_id)));
        }

        let tool = self
            .registry
            .get(tool_id)
            .await
            .ok_or_else(|| Error::not_found(format!("tool '{}'", tool_id)))?;
        if !tool.is_available() {
            return Err(Error::tool_execution(format!(
                "tool '{}' is not available",
                tool_id
            )));
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::internal("Executor shutdown"))?;

        let limit = self.timeout_for(context);
        debug!(
            "Executing tool '{}' with timeout {}ms",
            tool_id,
            limit.as_millis()
        );

        let record_id = self.tracker.start_execution(tool_id, context).await;
        let start = Instant::now();
        let input = Value::Object(parameters.into_iter().collect::<Map<_, _>>());
        let outcome = timeout(limit, tool.execute(input)).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(data)) => ToolResult::success(data),
            Ok(Err(e)) => {
                debug!("Tool '{}' reported failure: {}", tool_id, e);
                ToolResult::failure(
                    ToolError::new(e.to_string())
                        .with_details(format!("{:?}", e))
                        .with_code("TOOL_ERROR"),
                )
            }
            Err(_) => {
                warn!("Tool '{}' timed out after {}ms", tool_id, limit.as_millis());
                self.tracker.timeout_execution(&record_id).await;
                return Ok(ToolResult::failure(
                    ToolError::new(format!(
                        "Tool execution timed out after {}ms",
                        limit.as_millis()
                    ))
                    .with_code("TIMEOUT"),
                )
                .with_metadata("tool", json!(tool_id))
                .with_metadata("duration_ms", json!(elapsed_ms)));
            }
        };

        self.tracker.finish_execution(&record_id, &result).await;
        Ok(result
            .with_metadata("tool", json!(tool_id))
            .with_metadata("duration_ms", json!(elapsed_ms))
            .with_metadata("invocation_id", json!(record_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimpleTool;
    use crate::Tool;
    use tc_core::ExecutionStatus;

    async fn registry_with_tools() -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register_tool(Arc::new(SimpleTool::new(
                "double",
                "Double n",
                json!({"type": "object"}),
                |input| {
                    let n = input.get("n").and_then(Value::as_i64).unwrap_or(0);
                    Ok(json!(n * 2))
                },
            )))
            .await
            .unwrap();
        registry
            .register_tool(Arc::new(SimpleTool::new(
                "broken",
                "Always fails",
                json!({"type": "object"}),
                |_| Err(anyhow::anyhow!("disk on fire")),
            )))
            .await
            .unwrap();
        registry
    }

    fn params(pairs: &[(&str, Value)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_execute_success_records_history() {
        let executor = RegistryExecutor::with_defaults(registry_with_tools().await);
        let ctx = InvocationContext::for_run("run-7");

        let result = executor
            .execute_tool("double", params(&[("n", json!(21))]), &ctx, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.is_success);
        assert_eq!(result.data, json!(42));
        assert_eq!(result.metadata.get("tool"), Some(&json!("double")));

        let history = executor.tracker().get_by_session("run-7").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_tool_error_is_failed_result() {
        let executor = RegistryExecutor::with_defaults(registry_with_tools().await);
        let ctx = InvocationContext::for_run("run-1");

        let result = executor
            .execute_tool("broken", Parameters::new(), &ctx, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.is_success);
        assert_eq!(result.error_message(), Some("disk on fire"));
        assert_eq!(
            result.error.as_ref().and_then(|e| e.code.as_deref()),
            Some("TOOL_ERROR")
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invocation_error() {
        let executor = RegistryExecutor::with_defaults(registry_with_tools().await);
        let err = executor
            .execute_tool(
                "nope",
                Parameters::new(),
                &InvocationContext::for_run("run-1"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancelled_token_refuses_to_start() {
        let executor = RegistryExecutor::with_defaults(registry_with_tools().await);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor
            .execute_tool("double", Parameters::new(), &InvocationContext::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
        assert!(executor.tracker().get_recent(10).await.is_empty());
    }

    struct SleepyTool;

    #[async_trait]
    impl Tool for SleepyTool {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn description(&self) -> &str {
            "Sleeps for a long time"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _input: Value) -> anyhow::Result<Value> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_produces_failed_result() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register_tool(Arc::new(SleepyTool)).await.unwrap();
        let executor = RegistryExecutor::new(
            registry,
            ExecutorConfig {
                default_timeout_ms: 50,
                ..ExecutorConfig::default()
            },
        );

        let result = executor
            .execute_tool(
                "sleepy",
                Parameters::new(),
                &InvocationContext::for_run("run-1"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!result.is_success);
        assert_eq!(
            result.error.as_ref().and_then(|e| e.code.as_deref()),
            Some("TIMEOUT")
        );
        let stats = executor.tracker().get_stats().await;
        assert_eq!(stats.timed_out_executions, 1);
    }
}
