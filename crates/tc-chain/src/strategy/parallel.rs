//! Parallel strategy: dependency-ordered groups, each group run concurrently
//!
//! Steps are grouped in rounds: a step joins the current round once every
//! step it depends on was placed in an earlier round. Outputs of a group are
//! published only after the whole group has finished, so a step never sees
//! an output from its own group. When no step is ready (a cycle or a
//! dependency on an unknown step) the rest are forced into one final group.

use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tc_core::{CancellationToken, ToolExecutor};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::context::ToolChainExecutionContext;
use crate::error::{ChainError, Result};
use crate::mapping::{resolve_parameters, StepOutputs};
use crate::result::ToolChainResult;
use crate::runner::{ReasoningNote, StepRun, StepRunner};
use crate::step::ToolChainStep;

pub struct ParallelStrategy {
    executor: Arc<dyn ToolExecutor>,
}

impl ParallelStrategy {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self { executor }
    }

    #[instrument(
        skip_all,
        fields(execution_id = %context.execution_id(), strategy = "parallel")
    )]
    pub async fn execute(
        &self,
        context: &ToolChainExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolChainResult>> {
        let groups = group_steps_by_dependencies(&context.steps);
        info!(
            steps = context.steps.len(),
            groups = groups.len(),
            "Starting parallel execution"
        );

        let runner = StepRunner::new(self.executor.clone(), context, cancel);
        let mut outputs = StepOutputs::new();
        let mut results = Vec::with_capacity(context.steps.len());

        for (index, group) in groups.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(completed = results.len(), "Parallel execution cancelled");
                return Err(ChainError::cancelled(results));
            }

            info!(group = index, size = group.len(), "Executing group");
            let (group_results, cancelled) =
                run_group(&runner, context, group, &outputs).await;

            let steps_by_id: HashMap<&str, &ToolChainStep> =
                group.iter().map(|s| (s.id.as_str(), *s)).collect();
            let mut halt = false;
            for result in &group_results {
                outputs.record(result);
                if let Some(step) = steps_by_id.get(result.step_id.as_str()) {
                    if result.halts_chain(step) {
                        warn!(step_id = %result.step_id, "Step failed in group");
                        halt = true;
                    }
                }
            }
            results.extend(group_results);

            if cancelled {
                return Err(ChainError::cancelled(results));
            }
            if halt {
                warn!(group = index, "Group contained a failed step, stopping chain");
                break;
            }
        }

        info!(
            succeeded = results.iter().filter(|r| r.success).count(),
            attempted = results.len(),
            "Parallel execution finished"
        );
        Ok(results)
    }
}

/// Run every step of a group concurrently; results come back in completion order
async fn run_group(
    runner: &StepRunner,
    context: &ToolChainExecutionContext,
    group: &[&ToolChainStep],
    outputs: &StepOutputs,
) -> (Vec<ToolChainResult>, bool) {
    let mut tasks = JoinSet::new();

    for step in group {
        let parameters = resolve_parameters(
            step,
            &context.global_parameters,
            outputs,
            context.mapping_mode,
        );
        let note = ReasoningNote {
            thought: format!("Executing {} in parallel", step.display_name()),
            action: format!("Execute tool {}", step.tool_id),
        };
        let runner = runner.clone();
        let step = (*step).clone();

        tasks.spawn(async move {
            let run = AssertUnwindSafe(runner.run(&step, parameters.clone(), note))
                .catch_unwind()
                .await;
            match run {
                Ok(run) => run,
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    error!(step_id = %step.id, reason = %reason, "Step task panicked");
                    StepRun::Finished(ToolChainResult::invocation_error(
                        &step,
                        format!("step task panicked: {}", reason),
                        &parameters,
                    ))
                }
            }
        });
    }

    let mut results = Vec::with_capacity(group.len());
    let mut cancelled = false;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(StepRun::Finished(result)) => results.push(result),
            Ok(StepRun::Cancelled) => cancelled = true,
            Err(e) => error!(error = %e, "Step task could not be joined"),
        }
    }
    (results, cancelled)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Partition steps into rounds that respect data and ordering dependencies.
///
/// Every step lands in exactly one group and groups keep declaration order.
pub fn group_steps_by_dependencies(steps: &[ToolChainStep]) -> Vec<Vec<&ToolChainStep>> {
    let mut groups = Vec::new();
    let mut processed: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<&ToolChainStep> = steps.iter().collect();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|step| {
            step.dependencies()
                .iter()
                .all(|dep| processed.contains(*dep))
        });

        if ready.is_empty() {
            warn!(
                steps = ?blocked.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
                "Circular or unresolved dependencies, running remaining steps together"
            );
            groups.push(blocked);
            break;
        }

        processed.extend(ready.iter().map(|s| s.id.as_str()));
        groups.push(ready);
        remaining = blocked;
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::SourceRef;

    fn ids(groups: &[Vec<&ToolChainStep>]) -> Vec<Vec<String>> {
        groups
            .iter()
            .map(|g| g.iter().map(|s| s.id.clone()).collect())
            .collect()
    }

    fn mapped(id: &str, source: &str) -> ToolChainStep {
        ToolChainStep::new(id, "echo").with_mapping("input", SourceRef::parse(source).unwrap())
    }

    #[test]
    fn test_independent_steps_share_a_group() {
        let steps = vec![
            ToolChainStep::new("A", "echo"),
            mapped("B", "A.output"),
            ToolChainStep::new("C", "echo"),
        ];
        assert_eq!(ids(&group_steps_by_dependencies(&steps)), vec![vec!["A", "C"], vec!["B"]]);
    }

    #[test]
    fn test_grouping_ignores_declaration_order() {
        let steps = vec![
            mapped("B", "A.output"),
            ToolChainStep::new("A", "echo"),
            ToolChainStep::new("C", "echo"),
        ];
        assert_eq!(ids(&group_steps_by_dependencies(&steps)), vec![vec!["A", "C"], vec!["B"]]);
    }

    #[test]
    fn test_chain_of_dependencies() {
        let steps = vec![
            ToolChainStep::new("A", "echo"),
            mapped("B", "A"),
            mapped("C", "B.x"),
            ToolChainStep::new("D", "echo").depends_on("A"),
        ];
        assert_eq!(
            ids(&group_steps_by_dependencies(&steps)),
            vec![vec!["A"], vec!["B", "D"], vec!["C"]]
        );
    }

    #[test]
    fn test_cycle_forced_into_final_group() {
        let steps = vec![
            ToolChainStep::new("R", "echo"),
            mapped("A", "B.output"),
            mapped("B", "A.output"),
        ];
        assert_eq!(ids(&group_steps_by_dependencies(&steps)), vec![vec!["R"], vec!["A", "B"]]);
    }

    #[test]
    fn test_unknown_dependency_forced_into_final_group() {
        let steps = vec![mapped("A", "ghost.output"), ToolChainStep::new("B", "echo")];
        assert_eq!(ids(&group_steps_by_dependencies(&steps)), vec![vec!["B"], vec!["A"]]);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_steps_by_dependencies(&[]).is_empty());
    }
}
