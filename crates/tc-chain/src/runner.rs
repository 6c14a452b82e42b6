//! Single-step execution shared by all strategies
//!
//! Appends the reasoning entry, invokes the tool (with retries when the step
//! has a policy), turns the outcome into a `ToolChainResult` and records the
//! intermediate result.

use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tc_core::{
    CancellationToken, Error as CoreError, InvocationContext, Parameters, ToolExecutor, ToolResult,
};
use tracing::{debug, info, warn};

use crate::context::{IntermediateResult, ReasoningStep, SharedLog, ToolChainExecutionContext};
use crate::result::ToolChainResult;
use crate::step::ToolChainStep;

/// Observation recorded while a step is in flight
pub const PENDING_OBSERVATION: &str = "Executing...";

/// Observation left on the entry of a step the executor refused to start
pub const REFUSED_OBSERVATION: &str = "Refused: run cancelled before the step started";

/// Thought and action describing a step about to run
#[derive(Debug, Clone)]
pub struct ReasoningNote {
    pub thought: String,
    pub action: String,
}

/// Outcome of running one step
#[derive(Debug)]
pub enum StepRun {
    Finished(ToolChainResult),
    /// The tool refused to start because the run was cancelled
    Cancelled,
}

/// Cheap-to-clone handle for running steps; owned so it can move into tasks
#[derive(Clone)]
pub struct StepRunner {
    executor: Arc<dyn ToolExecutor>,
    invocation: Arc<InvocationContext>,
    enable_reasoning: bool,
    reasoning: SharedLog<ReasoningStep>,
    intermediate: SharedLog<IntermediateResult>,
    cancel: CancellationToken,
}

impl StepRunner {
    pub fn new(
        executor: Arc<dyn ToolExecutor>,
        context: &ToolChainExecutionContext,
        cancel: &CancellationToken,
    ) -> Self {
        Self {
            executor,
            invocation: Arc::new(context.run.invocation_context()),
            enable_reasoning: context.enable_reasoning,
            reasoning: context.reasoning_steps.clone(),
            intermediate: context.intermediate_results.clone(),
            cancel: cancel.clone(),
        }
    }

    pub async fn run(
        &self,
        step: &ToolChainStep,
        parameters: Parameters,
        note: ReasoningNote,
    ) -> StepRun {
        let reasoning_index = if self.enable_reasoning {
            Some(
                self.reasoning
                    .push(ReasoningStep::new(note.thought, note.action, PENDING_OBSERVATION))
                    .await,
            )
        } else {
            None
        };

        let start = Instant::now();
        let (outcome, attempts) = self.invoke_with_retry(step, &parameters).await;
        let elapsed = start.elapsed();

        let result = match outcome {
            Ok(tool_result) => {
                let result =
                    ToolChainResult::from_tool_result(step, tool_result, &parameters, elapsed);
                self.intermediate
                    .push(IntermediateResult {
                        step_id: step.id.clone(),
                        output: result.output.clone(),
                        metadata: result.metadata.clone(),
                        timestamp: chrono::Utc::now(),
                    })
                    .await;
                result
            }
            Err(CoreError::Cancelled(reason)) => {
                info!(step_id = %step.id, reason = %reason, "Step not started, run cancelled");
                if let Some(index) = reasoning_index {
                    self.reasoning
                        .update(index, |entry| {
                            entry.observation = REFUSED_OBSERVATION.to_string()
                        })
                        .await;
                }
                return StepRun::Cancelled;
            }
            Err(e) => {
                warn!(step_id = %step.id, tool_id = %step.tool_id, error = %e, "Step invocation failed");
                ToolChainResult::invocation_error(step, e, &parameters)
            }
        };

        if let Some(index) = reasoning_index {
            let observation = if result.success {
                "Success: Tool executed successfully".to_string()
            } else {
                format!("Failed: {}", result.message)
            };
            self.reasoning
                .update(index, |entry| entry.observation = observation)
                .await;
        }

        debug!(
            step_id = %step.id,
            success = result.success,
            attempts,
            duration_ms = result.execution_time.as_millis() as u64,
            "Step finished"
        );
        StepRun::Finished(result.with_metadata("attempts", json!(attempts)))
    }

    /// Invoke the step's tool, retrying failures per its policy.
    ///
    /// Returns the last outcome and the number of attempts made. A
    /// cancellation refusal on a retry yields the previous outcome instead.
    async fn invoke_with_retry(
        &self,
        step: &ToolChainStep,
        parameters: &Parameters,
    ) -> (tc_core::Result<ToolResult>, u32) {
        let max_attempts = step.retry.as_ref().map_or(1, |policy| policy.attempts());
        let mut attempt = 0;
        let mut previous: Option<tc_core::Result<ToolResult>> = None;

        loop {
            attempt += 1;
            let outcome = self
                .executor
                .execute_tool(&step.tool_id, parameters.clone(), &self.invocation, &self.cancel)
                .await;

            if matches!(outcome, Err(CoreError::Cancelled(_))) {
                return match previous {
                    Some(last) => (last, attempt - 1),
                    None => (outcome, attempt),
                };
            }

            let succeeded = matches!(&outcome, Ok(result) if result.is_success);
            if succeeded || attempt >= max_attempts || self.cancel.is_cancelled() {
                return (outcome, attempt);
            }

            if let Some(policy) = &step.retry {
                let delay = policy.delay_after(attempt);
                warn!(
                    step_id = %step.id,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Step attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            previous = Some(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::RetryPolicy;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tc_core::ToolError;

    /// Fails until the configured attempt, then echoes its parameters
    struct Flaky {
        succeed_on: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ToolExecutor for Flaky {
        async fn execute_tool(
            &self,
            _tool_id: &str,
            parameters: Parameters,
            _context: &InvocationContext,
            _cancel: &CancellationToken,
        ) -> tc_core::Result<ToolResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(ToolResult::success(Value::Object(parameters.into_iter().collect())))
            } else {
                Ok(ToolResult::failure(ToolError::new(format!("attempt {} failed", call))))
            }
        }
    }

    /// Refuses every call once the token is cancelled
    struct Refusing;

    #[async_trait]
    impl ToolExecutor for Refusing {
        async fn execute_tool(
            &self,
            tool_id: &str,
            _parameters: Parameters,
            _context: &InvocationContext,
            cancel: &CancellationToken,
        ) -> tc_core::Result<ToolResult> {
            if cancel.is_cancelled() {
                return Err(CoreError::cancelled(format!("tool '{}' not started", tool_id)));
            }
            Ok(ToolResult::success(Value::Null))
        }
    }

    fn note() -> ReasoningNote {
        ReasoningNote {
            thought: "Need to run".to_string(),
            action: "Run".to_string(),
        }
    }

    fn runner_for(executor: Arc<dyn ToolExecutor>, ctx: &ToolChainExecutionContext) -> StepRunner {
        StepRunner::new(executor, ctx, &CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let executor = Arc::new(Flaky {
            succeed_on: 3,
            calls: AtomicU32::new(0),
        });
        let ctx = ToolChainExecutionContext::new(vec![]).with_reasoning(5);
        let step = ToolChainStep::new("S1", "flaky").with_retry(RetryPolicy::new(3, 10));

        let StepRun::Finished(result) = runner_for(executor.clone(), &ctx)
            .run(&step, Parameters::new(), note())
            .await
        else {
            panic!("step was cancelled");
        };

        assert!(result.success);
        assert_eq!(result.metadata["attempts"], json!(3));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);

        let trace = ctx.reasoning_steps.snapshot().await;
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].observation, "Success: Tool executed successfully");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted_reports_last_failure() {
        let executor = Arc::new(Flaky {
            succeed_on: 10,
            calls: AtomicU32::new(0),
        });
        let ctx = ToolChainExecutionContext::new(vec![]).with_reasoning(5);
        let step = ToolChainStep::new("S1", "flaky").with_retry(RetryPolicy::new(2, 10));

        let StepRun::Finished(result) = runner_for(executor, &ctx)
            .run(&step, Parameters::new(), note())
            .await
        else {
            panic!("step was cancelled");
        };

        assert!(!result.success);
        assert_eq!(result.message, "attempt 2 failed");
        assert_eq!(result.metadata["attempts"], json!(2));
        let trace = ctx.reasoning_steps.snapshot().await;
        assert_eq!(trace[0].observation, "Failed: attempt 2 failed");
    }

    #[tokio::test]
    async fn test_no_reasoning_when_disabled() {
        let executor = Arc::new(Flaky {
            succeed_on: 1,
            calls: AtomicU32::new(0),
        });
        let ctx = ToolChainExecutionContext::new(vec![]);
        let step = ToolChainStep::new("S1", "flaky");

        runner_for(executor, &ctx)
            .run(&step, Parameters::new(), note())
            .await;

        assert!(ctx.reasoning_steps.is_empty().await);
        assert_eq!(ctx.intermediate_results.len().await, 1);
    }

    #[tokio::test]
    async fn test_refused_step_marks_reasoning_entry() {
        let ctx = ToolChainExecutionContext::new(vec![]).with_reasoning(5);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let step = ToolChainStep::new("S1", "anything");

        let run = StepRunner::new(Arc::new(Refusing), &ctx, &cancel)
            .run(&step, Parameters::new(), note())
            .await;

        assert!(matches!(run, StepRun::Cancelled));
        let trace = ctx.reasoning_steps.snapshot().await;
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].observation, REFUSED_OBSERVATION);
        assert!(ctx.intermediate_results.is_empty().await);
    }
}
