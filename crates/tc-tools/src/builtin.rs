//! Built-in tools
//!
//! Small general-purpose tools that make chains runnable out of the box:
//! - `echo`: returns its parameters
//! - `fail`: always fails
//! - `delay`: waits for a duration
//! - `log`: logs a message
//! - `concat`: joins values into a string

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::{Tool, ToolRegistry};

/// Register all built-in tools
pub async fn register_builtin_tools(registry: &ToolRegistry) -> Result<()> {
    registry.register_tool(Arc::new(EchoTool)).await?;
    registry.register_tool(Arc::new(FailTool)).await?;
    registry.register_tool(Arc::new(DelayTool)).await?;
    registry.register_tool(Arc::new(LogTool)).await?;
    registry.register_tool(Arc::new(ConcatTool)).await?;
    Ok(())
}

/// Echo tool - returns the parameter object it was given
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the parameters unchanged"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn tags(&self) -> Vec<String> {
        vec!["debug".to_string()]
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        Ok(input)
    }
}

/// Fail tool - always reports a failure
pub struct FailTool;

#[async_trait]
impl Tool for FailTool {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Fail with the given message"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Failure message"}
            }
        })
    }

    fn tags(&self) -> Vec<String> {
        vec!["debug".to_string()]
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let message = input
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Intentional failure");
        Err(anyhow!("{}", message))
    }
}

/// Delay tool - waits for `ms` milliseconds
pub struct DelayTool;

#[async_trait]
impl Tool for DelayTool {
    fn name(&self) -> &str {
        "delay"
    }

    fn description(&self) -> &str {
        "Wait for the given number of milliseconds"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ms": {"type": "integer", "minimum": 0}
            },
            "required": ["ms"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let ms = input
            .get("ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("'ms' must be a non-negative integer"))?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({"delayed_ms": ms}))
    }
}

/// Log tool - writes a message to the log
pub struct LogTool;

#[async_trait]
impl Tool for LogTool {
    fn name(&self) -> &str {
        "log"
    }

    fn description(&self) -> &str {
        "Log a message at info level"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {}
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let message = match input.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => return Err(anyhow!("'message' is required")),
        };
        tracing::info!(target: "tc_tools::log", "{}", message);
        Ok(json!({"logged": true, "message": message}))
    }
}

/// Concat tool - joins `parts` with an optional `separator`
pub struct ConcatTool;

#[async_trait]
impl Tool for ConcatTool {
    fn name(&self) -> &str {
        "concat"
    }

    fn description(&self) -> &str {
        "Join a list of values into one string"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "parts": {"type": "array"},
                "separator": {"type": "string"}
            },
            "required": ["parts"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let parts = input
            .get("parts")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("'parts' must be an array"))?;
        let separator = input
            .get("separator")
            .and_then(Value::as_str)
            .unwrap_or("");

        let joined = parts
            .iter()
            .map(|p| match p {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(separator);
        Ok(Value::String(joined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_builtins() {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry).await.unwrap();

        let names: Vec<_> = registry.list().await.into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["concat", "delay", "echo", "fail", "log"]);
    }

    #[tokio::test]
    async fn test_echo_returns_input() {
        let input = json!({"msg": "A"});
        assert_eq!(EchoTool.execute(input.clone()).await.unwrap(), input);
    }

    #[tokio::test]
    async fn test_fail_uses_message() {
        let err = FailTool
            .execute(json!({"message": "bad step"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "bad step");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay() {
        let out = DelayTool.execute(json!({"ms": 250})).await.unwrap();
        assert_eq!(out, json!({"delayed_ms": 250}));
        assert!(DelayTool.execute(json!({"ms": "soon"})).await.is_err());
    }

    #[tokio::test]
    async fn test_log_stringifies_non_strings() {
        let out = LogTool.execute(json!({"message": {"k": 1}})).await.unwrap();
        assert_eq!(out, json!({"logged": true, "message": "{\"k\":1}"}));
    }

    #[tokio::test]
    async fn test_concat() {
        let out = ConcatTool
            .execute(json!({"parts": ["a", 1, true], "separator": "-"}))
            .await
            .unwrap();
        assert_eq!(out, json!("a-1-true"));
    }
}
