//! Core Tool trait and types
//!
//! Defines the interface every tool reachable from a chain step implements.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tc_core::ToolDefinition;

/// Core trait for all tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name (unique identifier, referenced as a step's tool id)
    fn name(&self) -> &str;

    /// Get human-readable description
    fn description(&self) -> &str;

    /// Get JSON schema for input validation. Names listed under `required`
    /// must be supplied by every step using this tool.
    fn input_schema(&self) -> Value;

    /// Execute the tool with its parameters as a JSON object.
    ///
    /// An `Err` is reported to the chain as a tool failure.
    async fn execute(&self, input: Value) -> Result<Value>;

    /// Get the category this tool belongs to
    fn category(&self) -> &str {
        "general"
    }

    /// Get tags for tool discovery
    fn tags(&self) -> Vec<String> {
        vec![]
    }

    /// Check if tool is available (e.g., dependencies met)
    fn is_available(&self) -> bool {
        true
    }

    /// Metadata view of this tool
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            category: self.category().to_string(),
            tags: self.tags(),
        }
    }
}

/// Type alias for shared tools
pub type BoxedTool = Arc<dyn Tool>;

/// Closure-backed tool, handy for ad-hoc tools and tests
#[derive(Clone)]
pub struct SimpleTool {
    name: String,
    description: String,
    schema: Value,
    handler: Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>,
}

impl SimpleTool {
    pub fn new<F>(name: &str, description: &str, schema: Value, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            schema,
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl Tool for SimpleTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        (self.handler)(input)
    }
}
