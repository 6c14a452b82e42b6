//! Common types shared by the tool layer and the chain engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Named parameters passed to a tool
pub type Parameters = HashMap<String, Value>;

/// Tool definition (metadata only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_category() -> String {
    "general".to_string()
}

impl ToolDefinition {
    /// Parameter names listed under `required` in the input schema
    pub fn required_parameters(&self) -> Vec<String> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Error reported by a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
            code: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Uniform result of one tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub is_success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<ToolError>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        Self {
            is_success: true,
            data,
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(error: ToolError) -> Self {
        Self {
            is_success: false,
            data: Value::Null,
            error: Some(error),
            metadata: HashMap::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Error message, if the tool reported one
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

/// Identity under which a tool is invoked
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvocationContext {
    pub user_id: String,
    pub session_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub custom: HashMap<String, Value>,
}

impl InvocationContext {
    /// Context used for every step of a chain run
    pub fn for_run(execution_id: &str) -> Self {
        Self {
            user_id: "system".to_string(),
            session_id: execution_id.to_string(),
            conversation_id: execution_id.to_string(),
            custom: HashMap::new(),
        }
    }
}

/// Correlation metadata for one chain run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Unique execution ID
    pub execution_id: String,

    /// Trace ID shared with child runs
    pub trace_id: String,

    /// Parent execution ID (if this is a sub-run)
    pub parent_id: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Caller supplied metadata
    pub metadata: Value,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            trace_id: Uuid::new_v4().to_string(),
            parent_id: None,
            created_at: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }

    /// Use a caller supplied execution ID
    pub fn with_execution_id(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            ..Self::new()
        }
    }

    /// Create a child context sharing the trace ID
    pub fn new_child(parent: &RunContext) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            trace_id: parent.trace_id.clone(),
            parent_id: Some(parent.execution_id.clone()),
            created_at: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }

    pub fn invocation_context(&self) -> InvocationContext {
        InvocationContext::for_run(&self.execution_id)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
