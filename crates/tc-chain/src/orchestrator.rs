//! Tool Chain Orchestrator
//!
//! Front door for running a chain:
//! - Validates the request against itself and the tool catalog
//! - Builds the execution context and selects the strategy
//! - Applies the chain timeout through a child cancellation token
//! - Produces a `ChainReport` with results, reasoning trace and summary

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tc_core::config::{get_config, get_config_bool, get_config_int};
use tc_core::{CancellationToken, Parameters, RunContext, ToolCatalog, ToolExecutor};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::context::{
    IntermediateResult, ReasoningStep, ToolChainExecutionContext, DEFAULT_MAX_REASONING_STEPS,
};
use crate::error::{ChainError, Result};
use crate::reference::MappingMode;
use crate::result::ToolChainResult;
use crate::step::ToolChainStep;
use crate::strategy::{ExecutionStrategy, StrategyKind};

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Strategy used when a request does not name one
    pub default_strategy: StrategyKind,
    /// Reasoning budget used when a request does not set one
    pub max_reasoning_steps: usize,
    /// Chain timeout used when a request does not set one
    pub timeout: Option<Duration>,
    /// Check tool ids and required parameters against the catalog
    pub validate_tools: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_strategy: StrategyKind::Sequential,
            max_reasoning_steps: DEFAULT_MAX_REASONING_STEPS,
            timeout: None,
            validate_tools: true,
        }
    }
}

impl OrchestratorConfig {
    /// Read `TC_CHAIN_*` variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let strategy = get_config("TC_CHAIN_DEFAULT_STRATEGY", defaults.default_strategy.as_str());
        let default_strategy = strategy.parse().unwrap_or_else(|e| {
            warn!("Ignoring TC_CHAIN_DEFAULT_STRATEGY: {}", e);
            defaults.default_strategy
        });

        let max_reasoning_steps = usize::try_from(get_config_int(
            "TC_CHAIN_MAX_REASONING_STEPS",
            defaults.max_reasoning_steps as i64,
        ))
        .unwrap_or(defaults.max_reasoning_steps);

        let timeout = match get_config_int("TC_CHAIN_TIMEOUT_SECS", 0) {
            secs if secs > 0 => Some(Duration::from_secs(secs as u64)),
            _ => None,
        };

        Self {
            default_strategy,
            max_reasoning_steps,
            timeout,
            validate_tools: get_config_bool("TC_CHAIN_VALIDATE_TOOLS", defaults.validate_tools),
        }
    }
}

/// A chain to run, as submitted by a caller or loaded from a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub strategy: Option<StrategyKind>,
    pub steps: Vec<ToolChainStep>,
    #[serde(default)]
    pub enable_reasoning: bool,
    #[serde(default)]
    pub max_reasoning_steps: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub global_parameters: Parameters,
    #[serde(default)]
    pub mapping_mode: MappingMode,
}

impl ChainRequest {
    pub fn new(steps: Vec<ToolChainStep>) -> Self {
        Self {
            id: None,
            strategy: None,
            steps,
            enable_reasoning: false,
            max_reasoning_steps: None,
            timeout_secs: None,
            global_parameters: Parameters::new(),
            mapping_mode: MappingMode::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ChainError::Core(e.into()))
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_reasoning(mut self, max_reasoning_steps: Option<usize>) -> Self {
        self.enable_reasoning = true;
        self.max_reasoning_steps = max_reasoning_steps;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// How a chain run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    /// Every attempted step succeeded
    Completed,
    /// At least one attempted step failed
    Failed,
    /// The caller cancelled the run
    Cancelled,
    /// The chain timeout elapsed
    TimedOut,
}

/// Outcome of a chain run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainReport {
    pub chain_id: String,
    pub execution_id: String,
    pub strategy: StrategyKind,
    pub status: ChainStatus,
    pub success: bool,
    pub results: Vec<ToolChainResult>,
    pub reasoning_steps: Vec<ReasoningStep>,
    pub intermediate_results: Vec<IntermediateResult>,
    pub duration: Duration,
    pub summary: String,
}

impl ChainReport {
    pub fn succeeded_steps(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn result(&self, step_id: &str) -> Option<&ToolChainResult> {
        self.results.iter().find(|r| r.step_id == step_id)
    }
}

/// Validates and runs tool chains
pub struct ToolChainOrchestrator {
    executor: Arc<dyn ToolExecutor>,
    catalog: Option<Arc<dyn ToolCatalog>>,
    config: OrchestratorConfig,
}

impl ToolChainOrchestrator {
    pub fn new(executor: Arc<dyn ToolExecutor>, config: OrchestratorConfig) -> Self {
        Self {
            executor,
            catalog: None,
            config,
        }
    }

    /// Use `catalog` to check tool ids and required parameters
    pub fn with_catalog(mut self, catalog: Arc<dyn ToolCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Check a request without running it; all problems are reported together
    pub async fn validate(&self, request: &ChainRequest) -> Result<()> {
        let mut errors = Vec::new();

        if request.steps.is_empty() {
            errors.push("Tool chain must contain at least one step".to_string());
        }

        let mut ids = HashSet::new();
        for step in &request.steps {
            if step.id.trim().is_empty() {
                errors.push(format!("Step using tool '{}' has an empty id", step.tool_id));
            } else if !ids.insert(step.id.as_str()) {
                errors.push(format!("Duplicate step id: {}", step.id));
            }
        }

        for step in &request.steps {
            for (parameter, source) in &step.parameter_mapping {
                if !ids.contains(source.step_id()) {
                    errors.push(format!(
                        "Step '{}' maps parameter '{}' from unknown step '{}'",
                        step.id,
                        parameter,
                        source.step_id()
                    ));
                }
            }
            for dependency in &step.depends_on {
                if !ids.contains(dependency.as_str()) {
                    errors.push(format!(
                        "Step '{}' depends on unknown step '{}'",
                        step.id, dependency
                    ));
                }
            }
            for condition in &step.execution_conditions {
                if let Some(referenced) = condition.referenced_step() {
                    if !ids.contains(referenced) {
                        warn!(
                            step_id = %step.id,
                            referenced = %referenced,
                            "Condition refers to a step outside the chain"
                        );
                    }
                }
            }
        }

        if self.config.validate_tools {
            if let Some(catalog) = &self.catalog {
                for step in &request.steps {
                    let Some(definition) = catalog.tool_definition(&step.tool_id).await else {
                        errors.push(format!(
                            "Step '{}' uses unknown tool '{}'",
                            step.id, step.tool_id
                        ));
                        continue;
                    };
                    for required in definition.required_parameters() {
                        let supplied = step.parameters.contains_key(&required)
                            || step.parameter_mapping.contains_key(&required)
                            || request.global_parameters.contains_key(&required);
                        if !supplied {
                            errors.push(format!(
                                "Step '{}' does not provide required parameter '{}' for tool '{}'",
                                step.id, required, step.tool_id
                            ));
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ChainError::Validation(errors))
        }
    }

    /// Validate and run a chain.
    ///
    /// Cancellation through `cancel` or the chain timeout yields a report
    /// with status `Cancelled` or `TimedOut` holding the results gathered so
    /// far.
    pub async fn run(&self, request: ChainRequest, cancel: &CancellationToken) -> Result<ChainReport> {
        self.validate(&request).await?;

        let kind = request.strategy.unwrap_or(self.config.default_strategy);
        let chain_id = request
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut run = RunContext::new();
        run.metadata = json!({"chain_id": chain_id, "strategy": kind.as_str()});

        let mut context = ToolChainExecutionContext::new(request.steps)
            .with_run(run)
            .with_mapping_mode(request.mapping_mode)
            .with_global_parameters(request.global_parameters);
        if request.enable_reasoning {
            context = context.with_reasoning(
                request
                    .max_reasoning_steps
                    .unwrap_or(self.config.max_reasoning_steps),
            );
        }

        let run_token = cancel.child_token();
        let timeout = request
            .timeout_secs
            .map(Duration::from_secs)
            .or(self.config.timeout);
        let timer = timeout.map(|limit| {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        warn!(timeout_secs = limit.as_secs_f64(), "Chain timeout elapsed, cancelling");
                        token.cancel();
                    }
                }
            })
        });

        let span = info_span!(
            "tool_chain",
            chain_id = %chain_id,
            execution_id = %context.execution_id(),
            strategy = %kind
        );
        info!(parent: &span, steps = context.steps.len(), "Running tool chain");

        let start = Instant::now();
        let strategy = ExecutionStrategy::new(kind, self.executor.clone());
        let outcome = strategy
            .execute(&context, &run_token)
            .instrument(span.clone())
            .await;
        let duration = start.elapsed();

        if let Some(timer) = timer {
            timer.abort();
        }

        let (results, status) = match outcome {
            Ok(results) => {
                let status = if results.iter().all(|r| r.success) {
                    ChainStatus::Completed
                } else {
                    ChainStatus::Failed
                };
                (results, status)
            }
            Err(ChainError::Cancelled { completed }) => {
                let status = if cancel.is_cancelled() {
                    ChainStatus::Cancelled
                } else {
                    ChainStatus::TimedOut
                };
                (completed, status)
            }
            Err(e) => return Err(e),
        };

        let summary = build_summary(&results);
        let report = ChainReport {
            chain_id,
            execution_id: context.execution_id().to_string(),
            strategy: kind,
            status,
            success: status == ChainStatus::Completed,
            reasoning_steps: context.reasoning_steps.snapshot().await,
            intermediate_results: context.intermediate_results.snapshot().await,
            results,
            duration,
            summary,
        };

        info!(
            parent: &span,
            status = ?report.status,
            succeeded = report.succeeded_steps(),
            attempted = report.results.len(),
            duration_ms = duration.as_millis() as u64,
            "Tool chain finished"
        );
        Ok(report)
    }
}

/// Human-readable report of a run's results
pub fn build_summary(results: &[ToolChainResult]) -> String {
    let succeeded = results.iter().filter(|r| r.success).count();
    let mut lines = vec![format!(
        "Tool chain completed with {} steps:",
        results.len()
    )];
    lines.extend(results.iter().map(|result| {
        let marker = if result.success { "[ok]" } else { "[failed]" };
        format!("  {} {}: {}", marker, result.step_name, result.message)
    }));
    lines.push(String::new());
    lines.push(format!(
        "Summary: {}/{} steps succeeded",
        succeeded,
        results.len()
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::SourceRef;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tc_core::{InvocationContext, ToolDefinition, ToolResult};

    struct EchoExecutor;

    #[async_trait]
    impl ToolExecutor for EchoExecutor {
        async fn execute_tool(
            &self,
            _tool_id: &str,
            parameters: Parameters,
            _context: &InvocationContext,
            _cancel: &CancellationToken,
        ) -> tc_core::Result<ToolResult> {
            Ok(ToolResult::success(Value::Object(parameters.into_iter().collect())))
        }
    }

    struct Catalog;

    #[async_trait]
    impl ToolCatalog for Catalog {
        async fn tool_definition(&self, tool_id: &str) -> Option<ToolDefinition> {
            let schema = match tool_id {
                "echo" => json!({"type": "object"}),
                "search" => json!({"type": "object", "required": ["query"]}),
                _ => return None,
            };
            Some(ToolDefinition {
                name: tool_id.to_string(),
                description: String::new(),
                input_schema: schema,
                category: "general".to_string(),
                tags: vec![],
            })
        }
    }

    fn orchestrator() -> ToolChainOrchestrator {
        ToolChainOrchestrator::new(Arc::new(EchoExecutor), OrchestratorConfig::default())
            .with_catalog(Arc::new(Catalog))
    }

    fn validation_errors(err: ChainError) -> Vec<String> {
        match err {
            ChainError::Validation(errors) => errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejects_empty_chain() {
        let err = orchestrator()
            .validate(&ChainRequest::new(vec![]))
            .await
            .unwrap_err();
        assert_eq!(
            validation_errors(err),
            vec!["Tool chain must contain at least one step"]
        );
    }

    #[tokio::test]
    async fn test_collects_all_problems() {
        let request = ChainRequest::new(vec![
            ToolChainStep::new("A", "echo"),
            ToolChainStep::new("A", "echo"),
            ToolChainStep::new("B", "nope"),
            ToolChainStep::new("C", "search").with_mapping("x", SourceRef::step("ghost")),
            ToolChainStep::new("D", "echo").depends_on("phantom"),
        ]);

        let errors = validation_errors(orchestrator().validate(&request).await.unwrap_err());
        assert!(errors.contains(&"Duplicate step id: A".to_string()));
        assert!(errors.contains(&"Step 'B' uses unknown tool 'nope'".to_string()));
        assert!(errors
            .contains(&"Step 'C' maps parameter 'x' from unknown step 'ghost'".to_string()));
        assert!(errors.contains(
            &"Step 'C' does not provide required parameter 'query' for tool 'search'".to_string()
        ));
        assert!(errors.contains(&"Step 'D' depends on unknown step 'phantom'".to_string()));
        assert_eq!(errors.len(), 5);
    }

    #[tokio::test]
    async fn test_required_parameter_sources() {
        let orchestrator = orchestrator();

        let mapped = ChainRequest::new(vec![
            ToolChainStep::new("A", "echo"),
            ToolChainStep::new("B", "search").with_mapping("query", SourceRef::step("A")),
        ]);
        assert!(orchestrator.validate(&mapped).await.is_ok());

        let mut global = ChainRequest::new(vec![ToolChainStep::new("B", "search")]);
        global
            .global_parameters
            .insert("query".to_string(), json!("rust"));
        assert!(orchestrator.validate(&global).await.is_ok());
    }

    #[tokio::test]
    async fn test_cycles_are_not_validation_errors() {
        let request = ChainRequest::new(vec![
            ToolChainStep::new("A", "echo").with_mapping("x", SourceRef::step("B")),
            ToolChainStep::new("B", "echo").with_mapping("x", SourceRef::step("A")),
        ]);
        assert!(orchestrator().validate(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_reports_summary() {
        let request = ChainRequest::new(vec![
            ToolChainStep::new("S1", "echo").with_parameter("msg", json!("A")),
            ToolChainStep::new("S2", "echo").with_mapping("in", SourceRef::parse("S1.output").unwrap()),
        ]);

        let report = orchestrator()
            .run(request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.status, ChainStatus::Completed);
        assert!(report.success);
        assert_eq!(report.strategy, StrategyKind::Sequential);
        assert_eq!(report.result("S2").unwrap().output, json!({"in": {"msg": "A"}}));
        assert!(report.summary.starts_with("Tool chain completed with 2 steps:"));
        assert!(report.summary.ends_with("Summary: 2/2 steps succeeded"));
        assert!(report.reasoning_steps.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = orchestrator()
            .run(ChainRequest::new(vec![ToolChainStep::new("S1", "echo")]), &cancel)
            .await
            .unwrap();

        assert_eq!(report.status, ChainStatus::Cancelled);
        assert!(!report.success);
        assert!(report.results.is_empty());
    }

    /// Cancels the caller's token from inside every tool call
    struct CancellingExecutor(CancellationToken);

    #[async_trait]
    impl ToolExecutor for CancellingExecutor {
        async fn execute_tool(
            &self,
            tool_id: &str,
            parameters: Parameters,
            context: &InvocationContext,
            cancel: &CancellationToken,
        ) -> tc_core::Result<ToolResult> {
            self.0.cancel();
            EchoExecutor
                .execute_tool(tool_id, parameters, context, cancel)
                .await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancel_with_timeout_pending() {
        let cancel = CancellationToken::new();
        let config = OrchestratorConfig {
            timeout: Some(Duration::from_secs(60)),
            ..OrchestratorConfig::default()
        };
        let orchestrator =
            ToolChainOrchestrator::new(Arc::new(CancellingExecutor(cancel.clone())), config);

        let request = ChainRequest::new(vec![
            ToolChainStep::new("S1", "echo"),
            ToolChainStep::new("S2", "echo"),
        ]);
        let report = orchestrator.run(request, &cancel).await.unwrap();

        assert_eq!(report.status, ChainStatus::Cancelled);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].step_id, "S1");
    }

    #[test]
    fn test_request_from_json() {
        let request = ChainRequest::from_json(
            r#"{
                "strategy": "Parallel",
                "enable_reasoning": true,
                "steps": [
                    {"id": "S1", "tool_id": "echo", "parameters": {"msg": "A"}},
                    {"id": "S2", "tool_id": "echo", "parameter_mapping": {"in": "${S1.output}"}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(request.strategy, Some(StrategyKind::Parallel));
        assert!(request.enable_reasoning);
        assert_eq!(request.steps[1].dependencies().into_iter().collect::<Vec<_>>(), vec!["S1"]);
        assert!(ChainRequest::from_json(r#"{"steps": [], "strategy": "random"}"#).is_err());
    }

    #[test]
    fn test_summary_format() {
        let step = ToolChainStep::new("S1", "echo");
        let ok = ToolChainResult::from_tool_result(
            &step,
            ToolResult::success(json!(1)),
            &Parameters::new(),
            Duration::ZERO,
        );
        let failed = ToolChainResult::invocation_error(&step, "boom", &Parameters::new());

        assert_eq!(
            build_summary(&[ok, failed]),
            "Tool chain completed with 2 steps:\n  [ok] Step S1: Completed successfully\n  [failed] Step S1: Error: boom\n\nSummary: 1/2 steps succeeded"
        );
    }
}
