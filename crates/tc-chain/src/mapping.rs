//! Step outputs and parameter resolution
//!
//! Only successful steps with a non-null output publish into `StepOutputs`.
//! Parameters for a step are assembled as global parameters, overlaid by the
//! step's static parameters, overlaid by mapped values. A mapping whose
//! source has not published is skipped; the parameter keeps whatever the
//! lower layers supplied, or stays absent.

use serde_json::Value;
use std::collections::HashMap;
use tc_core::Parameters;
use tracing::debug;

use crate::reference::MappingMode;
use crate::result::ToolChainResult;
use crate::step::ToolChainStep;

/// Outputs published by completed steps of one run, keyed by step id
#[derive(Debug, Clone, Default)]
pub struct StepOutputs {
    outputs: HashMap<String, Value>,
}

impl StepOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an output; null outputs are not stored. Returns whether it was stored.
    pub fn publish(&mut self, step_id: &str, output: &Value) -> bool {
        if output.is_null() {
            return false;
        }
        self.outputs.insert(step_id.to_string(), output.clone());
        true
    }

    /// Publish a step result if it succeeded
    pub fn record(&mut self, result: &ToolChainResult) -> bool {
        result.success && self.publish(&result.step_id, &result.output)
    }

    pub fn get(&self, step_id: &str) -> Option<&Value> {
        self.outputs.get(step_id)
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.outputs.contains_key(step_id)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Build the parameter set a step is invoked with
pub fn resolve_parameters(
    step: &ToolChainStep,
    global_parameters: &Parameters,
    outputs: &StepOutputs,
    mode: MappingMode,
) -> Parameters {
    let mut resolved = global_parameters.clone();
    resolved.extend(
        step.parameters
            .iter()
            .map(|(name, value)| (name.clone(), value.clone())),
    );

    for (parameter, source) in &step.parameter_mapping {
        let Some(output) = outputs.get(source.step_id()) else {
            debug!(
                step_id = %step.id,
                parameter = %parameter,
                source = %source,
                "Mapping source has no output, skipping"
            );
            continue;
        };

        match source.select(output, mode) {
            Some(value) => {
                resolved.insert(parameter.clone(), value.clone());
            }
            None => debug!(
                step_id = %step.id,
                parameter = %parameter,
                source = %source,
                "Mapping path not found in source output, skipping"
            ),
        }
    }

    resolved
}
