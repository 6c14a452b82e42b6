//! Chain step definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tc_core::Parameters;

use crate::condition::StepCondition;
use crate::reference::SourceRef;

/// Retry behaviour for a step whose invocation fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default)]
    pub exponential_backoff: bool,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_delay_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            exponential_backoff: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
            exponential_backoff: false,
        }
    }

    pub fn with_exponential_backoff(mut self) -> Self {
        self.exponential_backoff = true;
        self
    }

    /// Wait before the attempt following failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = if self.exponential_backoff {
            2u64.saturating_pow(attempt.saturating_sub(1))
        } else {
            1
        };
        Duration::from_millis(self.delay_ms.saturating_mul(factor))
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// One tool invocation in a chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChainStep {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub tool_id: String,
    #[serde(default)]
    pub description: String,
    /// Static parameters passed to the tool
    #[serde(default)]
    pub parameters: Parameters,
    /// Parameter name to the step output that supplies it
    #[serde(default)]
    pub parameter_mapping: BTreeMap<String, SourceRef>,
    /// All must hold for the conditional strategy to pick this step
    #[serde(default)]
    pub execution_conditions: Vec<StepCondition>,
    #[serde(default)]
    pub continue_on_error: bool,
    /// Ordering-only dependencies, in addition to those implied by mappings
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl ToolChainStep {
    pub fn new(id: impl Into<String>, tool_id: impl Into<String>) -> Self {
        let id = id.into();
        let tool_id = tool_id.into();
        Self {
            name: format!("Step {}", id),
            description: format!("Execute {}", tool_id),
            id,
            tool_id,
            parameters: Parameters::new(),
            parameter_mapping: BTreeMap::new(),
            execution_conditions: Vec::new(),
            continue_on_error: false,
            depends_on: Vec::new(),
            retry: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_mapping(mut self, parameter: impl Into<String>, source: SourceRef) -> Self {
        self.parameter_mapping.insert(parameter.into(), source);
        self
    }

    pub fn with_condition(mut self, condition: StepCondition) -> Self {
        self.execution_conditions.push(condition);
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.push(step_id.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Name for logs and results; falls back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Ids of steps that must finish before this one: mapping sources plus
    /// explicit `depends_on` entries.
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.parameter_mapping
            .values()
            .map(SourceRef::step_id)
            .chain(self.depends_on.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_defaults() {
        let step = ToolChainStep::new("S1", "echo").with_parameter("msg", json!("A"));
        assert_eq!(step.name, "Step S1");
        assert_eq!(step.description, "Execute echo");
        assert!(!step.continue_on_error);
        assert_eq!(step.parameters.get("msg"), Some(&json!("A")));
    }

    #[test]
    fn test_dependencies_merge_mappings_and_depends_on() {
        let step = ToolChainStep::new("C", "echo")
            .with_mapping("x", SourceRef::parse("A.output").unwrap())
            .with_mapping("y", SourceRef::parse("B").unwrap())
            .depends_on("A")
            .depends_on("D");
        let deps: Vec<_> = step.dependencies().into_iter().collect();
        assert_eq!(deps, vec!["A", "B", "D"]);
    }

    #[test]
    fn test_deserialize_minimal_step() {
        let step: ToolChainStep = serde_json::from_value(json!({
            "id": "S2",
            "tool_id": "echo",
            "parameter_mapping": {"in": "S1.output"},
            "execution_conditions": [{"type": "output_exists", "parameters": {"stepId": "S1"}}]
        }))
        .unwrap();

        assert_eq!(step.display_name(), "S2");
        assert_eq!(step.parameter_mapping["in"].step_id(), "S1");
        assert_eq!(step.execution_conditions.len(), 1);
        assert!(step.retry.is_none());
    }

    #[test]
    fn test_retry_delays() {
        let fixed = RetryPolicy::new(3, 100);
        assert_eq!(fixed.delay_after(1), Duration::from_millis(100));
        assert_eq!(fixed.delay_after(2), Duration::from_millis(100));

        let backoff = RetryPolicy::new(4, 100).with_exponential_backoff();
        assert_eq!(backoff.delay_after(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_after(3), Duration::from_millis(400));

        assert_eq!(RetryPolicy::new(0, 10).attempts(), 1);
    }
}
