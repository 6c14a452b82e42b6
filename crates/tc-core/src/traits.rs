//! Seams between the chain engine and the tool layer

use async_trait::async_trait;

use crate::{CancellationToken, InvocationContext, Parameters, Result, ToolDefinition, ToolResult};

/// Runs a named tool and reports a uniform result.
///
/// `Ok` with `is_success == false` is a tool-reported failure. `Err` is an
/// invocation failure (unknown tool, transport error, ...). The token may be
/// consulted before starting work; a call that has already started runs to
/// completion.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute_tool(
        &self,
        tool_id: &str,
        parameters: Parameters,
        context: &InvocationContext,
        cancel: &CancellationToken,
    ) -> Result<ToolResult>;
}

/// Read-only lookup of tool definitions, used for chain validation
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    async fn tool_definition(&self, tool_id: &str) -> Option<ToolDefinition>;
}
