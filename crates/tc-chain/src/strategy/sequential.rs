//! Sequential strategy: steps run one at a time in declaration order

use std::sync::Arc;
use tc_core::{CancellationToken, ToolExecutor};
use tracing::{info, instrument, warn};

use crate::context::ToolChainExecutionContext;
use crate::error::{ChainError, Result};
use crate::mapping::{resolve_parameters, StepOutputs};
use crate::result::ToolChainResult;
use crate::runner::{ReasoningNote, StepRun, StepRunner};
use crate::step::ToolChainStep;

pub struct SequentialStrategy {
    executor: Arc<dyn ToolExecutor>,
}

impl SequentialStrategy {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self { executor }
    }

    #[instrument(
        skip_all,
        fields(execution_id = %context.execution_id(), strategy = "sequential")
    )]
    pub async fn execute(
        &self,
        context: &ToolChainExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolChainResult>> {
        info!(steps = context.steps.len(), "Starting sequential execution");

        let runner = StepRunner::new(self.executor.clone(), context, cancel);
        let mut outputs = StepOutputs::new();
        let mut results = Vec::with_capacity(context.steps.len());

        for step in &context.steps {
            if cancel.is_cancelled() {
                warn!(completed = results.len(), "Sequential execution cancelled");
                return Err(ChainError::cancelled(results));
            }

            info!(step_id = %step.id, tool_id = %step.tool_id, "Executing step");
            let parameters = resolve_parameters(
                step,
                &context.global_parameters,
                &outputs,
                context.mapping_mode,
            );
            let note = reasoning_note(step, &parameters);

            let result = match runner.run(step, parameters, note).await {
                StepRun::Finished(result) => result,
                StepRun::Cancelled => return Err(ChainError::cancelled(results)),
            };

            outputs.record(&result);
            let halt = result.halts_chain(step);
            results.push(result);

            if halt {
                warn!(step_id = %step.id, "Step failed, stopping chain");
                break;
            }
        }

        info!(
            succeeded = results.iter().filter(|r| r.success).count(),
            attempted = results.len(),
            "Sequential execution finished"
        );
        Ok(results)
    }
}

fn reasoning_note(step: &ToolChainStep, parameters: &tc_core::Parameters) -> ReasoningNote {
    let mut names: Vec<&str> = parameters.keys().map(String::as_str).collect();
    names.sort_unstable();
    ReasoningNote {
        thought: format!(
            "Need to execute {} to {}",
            step.display_name(),
            step.description
        ),
        action: format!(
            "Execute tool {} with parameters: {}",
            step.tool_id,
            names.join(", ")
        ),
    }
}
