//! Per-step execution results

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tc_core::{Parameters, ToolResult};

use crate::step::ToolChainStep;

/// Outcome of one attempted step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChainResult {
    pub step_id: String,
    pub step_name: String,
    pub tool_id: String,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub output: Value,
    pub execution_time: Duration,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ToolChainResult {
    /// Result of a step whose tool returned, successfully or not
    pub fn from_tool_result(
        step: &ToolChainStep,
        tool_result: ToolResult,
        parameters: &Parameters,
        execution_time: Duration,
    ) -> Self {
        let message = if tool_result.is_success {
            "Completed successfully".to_string()
        } else {
            tool_result
                .error_message()
                .filter(|m| !m.is_empty())
                .unwrap_or("Failed")
                .to_string()
        };

        let mut metadata = HashMap::new();
        metadata.insert("parameters_used".to_string(), parameters_value(parameters));
        metadata.insert(
            "tool_metadata".to_string(),
            Value::Object(tool_result.metadata.into_iter().collect::<Map<_, _>>()),
        );

        Self {
            step_id: step.id.clone(),
            step_name: step.display_name().to_string(),
            tool_id: step.tool_id.clone(),
            success: tool_result.is_success,
            message,
            output: tool_result.data,
            execution_time,
            metadata,
        }
    }

    /// Result of a step whose invocation itself failed
    pub fn invocation_error(
        step: &ToolChainStep,
        error: impl std::fmt::Display,
        parameters: &Parameters,
    ) -> Self {
        let error = error.to_string();
        let mut metadata = HashMap::new();
        metadata.insert("error".to_string(), json!(error));
        metadata.insert("parameters_used".to_string(), parameters_value(parameters));

        Self {
            step_id: step.id.clone(),
            step_name: step.display_name().to_string(),
            tool_id: step.tool_id.clone(),
            success: false,
            message: format!("Error: {}", error),
            output: Value::Null,
            execution_time: Duration::ZERO,
            metadata,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// A failed step stops the chain unless it opted into continuing
    pub fn halts_chain(&self, step: &ToolChainStep) -> bool {
        !self.success && !step.continue_on_error
    }
}

fn parameters_value(parameters: &Parameters) -> Value {
    Value::Object(
        parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Map<_, _>>(),
    )
}
