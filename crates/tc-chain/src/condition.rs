//! Execution conditions for the conditional strategy
//!
//! Conditions are declared as `{"type": "...", "parameters": {...}}`; the
//! type is matched case-insensitively. Unrecognised types are kept so the
//! chain round-trips, and always evaluate to false.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tc_core::Parameters;
use tracing::warn;

use crate::mapping::StepOutputs;

/// Default reasoning-step threshold when none is given
pub const DEFAULT_REASONING_THRESHOLD: usize = 3;

/// Reasoning state visible to conditions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReasoningState {
    pub enabled: bool,
    pub count: usize,
}

/// A predicate gating a step in conditional mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCondition", into = "RawCondition")]
pub enum StepCondition {
    /// The named step has published an output
    OutputExists { step_id: Option<String> },
    /// The named step's output equals `value` exactly
    OutputEquals { step_id: Option<String>, value: Value },
    /// The named step's output, rendered as text, contains `value` ignoring case
    OutputContains {
        step_id: Option<String>,
        value: Option<String>,
    },
    /// Reasoning is enabled and at least `threshold` reasoning steps exist
    ReasoningThreshold { threshold: usize },
    Always,
    Never,
    Unknown { kind: String, parameters: Parameters },
}

#[derive(Serialize, Deserialize)]
struct RawCondition {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    parameters: Parameters,
}

impl StepCondition {
    pub fn output_exists(step_id: impl Into<String>) -> Self {
        StepCondition::OutputExists {
            step_id: Some(step_id.into()),
        }
    }

    pub fn output_equals(step_id: impl Into<String>, value: Value) -> Self {
        StepCondition::OutputEquals {
            step_id: Some(step_id.into()),
            value,
        }
    }

    pub fn output_contains(step_id: impl Into<String>, value: impl Into<String>) -> Self {
        StepCondition::OutputContains {
            step_id: Some(step_id.into()),
            value: Some(value.into()),
        }
    }

    pub fn reasoning_threshold(threshold: usize) -> Self {
        StepCondition::ReasoningThreshold { threshold }
    }

    /// Build a condition from its declared type name and parameters
    pub fn from_parts(kind: &str, parameters: Parameters) -> Self {
        let step_id = step_id_param(&parameters);
        match kind.trim().to_ascii_lowercase().as_str() {
            "output_exists" => StepCondition::OutputExists { step_id },
            "output_equals" => StepCondition::OutputEquals {
                step_id,
                value: parameters.get("value").cloned().unwrap_or(Value::Null),
            },
            "output_contains" => StepCondition::OutputContains {
                step_id,
                value: parameters
                    .get("value")
                    .filter(|v| !v.is_null())
                    .map(render_value),
            },
            "reasoning_threshold" => StepCondition::ReasoningThreshold {
                threshold: parameters
                    .get("threshold")
                    .and_then(parse_threshold)
                    .unwrap_or(DEFAULT_REASONING_THRESHOLD),
            },
            "always" => StepCondition::Always,
            "never" => StepCondition::Never,
            _ => StepCondition::Unknown {
                kind: kind.to_string(),
                parameters,
            },
        }
    }

    /// Step whose output this condition inspects, if any
    pub fn referenced_step(&self) -> Option<&str> {
        match self {
            StepCondition::OutputExists { step_id }
            | StepCondition::OutputEquals { step_id, .. }
            | StepCondition::OutputContains { step_id, .. } => step_id.as_deref(),
            _ => None,
        }
    }

    pub fn evaluate(&self, outputs: &StepOutputs, reasoning: ReasoningState) -> bool {
        match self {
            StepCondition::OutputExists { step_id } => {
                named(step_id).is_some_and(|id| outputs.contains(id))
            }
            StepCondition::OutputEquals { step_id, value } => named(step_id)
                .and_then(|id| outputs.get(id))
                .is_some_and(|output| output == value),
            StepCondition::OutputContains { step_id, value } => {
                match (named(step_id), value.as_deref().filter(|v| !v.is_empty())) {
                    (Some(id), Some(needle)) => outputs.get(id).is_some_and(|output| {
                        render_value(output)
                            .to_lowercase()
                            .contains(&needle.to_lowercase())
                    }),
                    _ => false,
                }
            }
            StepCondition::ReasoningThreshold { threshold } => {
                reasoning.enabled && reasoning.count >= *threshold
            }
            StepCondition::Always => true,
            StepCondition::Never => false,
            StepCondition::Unknown { kind, .. } => {
                warn!(condition = %kind, "Unknown condition type, treating as not met");
                false
            }
        }
    }

    fn kind_name(&self) -> &str {
        match self {
            StepCondition::OutputExists { .. } => "output_exists",
            StepCondition::OutputEquals { .. } => "output_equals",
            StepCondition::OutputContains { .. } => "output_contains",
            StepCondition::ReasoningThreshold { .. } => "reasoning_threshold",
            StepCondition::Always => "always",
            StepCondition::Never => "never",
            StepCondition::Unknown { kind, .. } => kind,
        }
    }
}

/// True when every condition holds; an empty list always holds
pub fn all_conditions_met(
    conditions: &[StepCondition],
    outputs: &StepOutputs,
    reasoning: ReasoningState,
) -> bool {
    conditions
        .iter()
        .all(|condition| condition.evaluate(outputs, reasoning))
}

/// Text form of a value: strings verbatim, everything else as JSON
pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn named(step_id: &Option<String>) -> Option<&str> {
    step_id.as_deref().filter(|id| !id.is_empty())
}

fn step_id_param(parameters: &Parameters) -> Option<String> {
    parameters
        .get("stepId")
        .or_else(|| parameters.get("step_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_threshold(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl From<RawCondition> for StepCondition {
    fn from(raw: RawCondition) -> Self {
        StepCondition::from_parts(&raw.kind, raw.parameters)
    }
}

impl From<StepCondition> for RawCondition {
    fn from(condition: StepCondition) -> Self {
        let kind = condition.kind_name().to_string();
        let mut parameters = Parameters::new();
        let put_step = |parameters: &mut Parameters, step_id: Option<String>| {
            if let Some(id) = step_id {
                parameters.insert("stepId".to_string(), Value::String(id));
            }
        };

        match condition {
            StepCondition::OutputExists { step_id } => put_step(&mut parameters, step_id),
            StepCondition::OutputEquals { step_id, value } => {
                put_step(&mut parameters, step_id);
                parameters.insert("value".to_string(), value);
            }
            StepCondition::OutputContains { step_id, value } => {
                put_step(&mut parameters, step_id);
                if let Some(value) = value {
                    parameters.insert("value".to_string(), Value::String(value));
                }
            }
            StepCondition::ReasoningThreshold { threshold } => {
                parameters.insert("threshold".to_string(), Value::from(threshold));
            }
            StepCondition::Always | StepCondition::Never => {}
            StepCondition::Unknown {
                parameters: original,
                ..
            } => parameters = original,
        }

        RawCondition { kind, parameters }
    }
}
