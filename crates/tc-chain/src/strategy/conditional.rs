//! Conditional strategy: repeatedly pick the first unexecuted step whose
//! conditions hold, until none qualifies, a step fails without
//! `continue_on_error` or the reasoning budget is spent.

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tc_core::{CancellationToken, ToolExecutor};
use tracing::{debug, info, instrument, warn};

use crate::condition::{all_conditions_met, ReasoningState};
use crate::context::ToolChainExecutionContext;
use crate::error::{ChainError, Result};
use crate::mapping::{resolve_parameters, StepOutputs};
use crate::result::ToolChainResult;
use crate::runner::{ReasoningNote, StepRun, StepRunner};
use crate::step::ToolChainStep;

pub struct ConditionalStrategy {
    executor: Arc<dyn ToolExecutor>,
}

impl ConditionalStrategy {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self { executor }
    }

    #[instrument(
        skip_all,
        fields(execution_id = %context.execution_id(), strategy = "conditional")
    )]
    pub async fn execute(
        &self,
        context: &ToolChainExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolChainResult>> {
        info!(steps = context.steps.len(), "Starting conditional execution");

        let runner = StepRunner::new(self.executor.clone(), context, cancel);
        let mut outputs = StepOutputs::new();
        let mut executed: HashSet<String> = HashSet::new();
        let mut results = Vec::new();

        loop {
            if cancel.is_cancelled() {
                warn!(completed = results.len(), "Conditional execution cancelled");
                return Err(ChainError::cancelled(results));
            }

            let reasoning = ReasoningState {
                enabled: context.enable_reasoning,
                count: context.reasoning_steps.len().await,
            };
            let Some(step) = determine_next_step(&context.steps, &executed, &outputs, reasoning)
            else {
                info!("No remaining step has its conditions met");
                break;
            };

            info!(step_id = %step.id, tool_id = %step.tool_id, "Conditions met, executing step");
            let parameters = resolve_parameters(
                step,
                &context.global_parameters,
                &outputs,
                context.mapping_mode,
            );
            let note = ReasoningNote {
                thought: format!(
                    "Based on current state, need to execute {}",
                    step.display_name()
                ),
                action: format!("Execute tool {} with conditions met", step.tool_id),
            };

            let result = match runner.run(step, parameters, note).await {
                StepRun::Finished(result) => result.with_metadata(
                    "conditions_evaluated",
                    json!(step.execution_conditions.len()),
                ),
                StepRun::Cancelled => return Err(ChainError::cancelled(results)),
            };

            executed.insert(step.id.clone());
            outputs.record(&result);
            let halt = result.halts_chain(step);
            results.push(result);

            if halt {
                warn!(step_id = %step.id, "Step failed, stopping chain");
                break;
            }

            if context.enable_reasoning
                && context.reasoning_steps.len().await >= context.max_reasoning_steps
            {
                info!(
                    max_reasoning_steps = context.max_reasoning_steps,
                    "Reasoning budget reached"
                );
                break;
            }
        }

        info!(
            succeeded = results.iter().filter(|r| r.success).count(),
            attempted = results.len(),
            "Conditional execution finished"
        );
        Ok(results)
    }
}

/// First step in declaration order that has not run and whose conditions all hold
pub fn determine_next_step<'a>(
    steps: &'a [ToolChainStep],
    executed: &HashSet<String>,
    outputs: &StepOutputs,
    reasoning: ReasoningState,
) -> Option<&'a ToolChainStep> {
    steps.iter().find(|step| {
        if executed.contains(&step.id) {
            return false;
        }
        let met = all_conditions_met(&step.execution_conditions, outputs, reasoning);
        if !met {
            debug!(step_id = %step.id, "Conditions not met");
        }
        met
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::StepCondition;

    #[test]
    fn test_first_eligible_step_wins() {
        let steps = vec![
            ToolChainStep::new("A", "echo").with_condition(StepCondition::output_exists("X")),
            ToolChainStep::new("B", "echo"),
            ToolChainStep::new("C", "echo"),
        ];
        let mut executed = HashSet::new();

        let next = determine_next_step(&steps, &executed, &StepOutputs::new(), ReasoningState::default());
        assert_eq!(next.map(|s| s.id.as_str()), Some("B"));

        executed.insert("B".to_string());
        let next = determine_next_step(&steps, &executed, &StepOutputs::new(), ReasoningState::default());
        assert_eq!(next.map(|s| s.id.as_str()), Some("C"));

        let mut outputs = StepOutputs::new();
        outputs.publish("X", &json!(1));
        executed.insert("C".to_string());
        let next = determine_next_step(&steps, &executed, &outputs, ReasoningState::default());
        assert_eq!(next.map(|s| s.id.as_str()), Some("A"));
    }

    #[test]
    fn test_nothing_eligible() {
        let steps = vec![ToolChainStep::new("A", "echo").with_condition(StepCondition::Never)];
        assert!(determine_next_step(
            &steps,
            &HashSet::new(),
            &StepOutputs::new(),
            ReasoningState::default()
        )
        .is_none());
    }
}
