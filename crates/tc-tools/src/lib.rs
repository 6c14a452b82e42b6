//! tc-tools: Tool Registry and Execution
//!
//! Provides the tool registry, the registry-backed `ToolExecutor` and the
//! built-in tools.

pub mod builtin;
pub mod executor;
pub mod registry;
pub mod tool;

// Re-export main types
pub use builtin::register_builtin_tools;
pub use executor::{ExecutorConfig, RegistryExecutor};
pub use registry::{RegistryStats, ToolRegistry};
pub use tool::{BoxedTool, SimpleTool, Tool};
