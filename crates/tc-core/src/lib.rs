//! Core types and utilities for the tool-chain engine
//!
//! # Modules
//!
//! - `cancel`: Cooperative cancellation signal for a chain run
//! - `config`: Environment configuration loading
//! - `error`: Error types and Result alias
//! - `execution`: Tool invocation history and statistics
//! - `traits`: The `ToolExecutor` and `ToolCatalog` seams
//! - `types`: Tool results, invocation and run contexts

pub mod cancel;
pub mod config;
pub mod error;
pub mod execution;
pub mod traits;
pub mod types;

// Re-exports
pub use cancel::CancellationToken;
pub use error::{Error, Result};
pub use execution::{ExecutionRecord, ExecutionStats, ExecutionStatus, ExecutionTracker};
pub use traits::{ToolCatalog, ToolExecutor};
pub use types::*;
