//! tc-chain: Tool-chain orchestration engine
//!
//! Runs ordered, parallel or condition-driven sequences of tool invocations:
//! - Declarative steps with static parameters and `stepId.path` mappings
//! - Sequential, dependency-grouped parallel and conditional strategies
//! - ReAct-style reasoning trace (thought, action, observation)
//! - Cooperative cancellation and chain timeouts
//! - Validation and reporting through `ToolChainOrchestrator`

pub mod condition;
pub mod context;
pub mod error;
pub mod mapping;
pub mod orchestrator;
pub mod reference;
pub mod result;
pub mod runner;
pub mod step;
pub mod strategy;

pub use condition::{ReasoningState, StepCondition};
pub use context::{IntermediateResult, ReasoningStep, SharedLog, ToolChainExecutionContext};
pub use error::{ChainError, Result};
pub use mapping::{resolve_parameters, StepOutputs};
pub use orchestrator::{
    ChainReport, ChainRequest, ChainStatus, OrchestratorConfig, ToolChainOrchestrator,
};
pub use reference::{MappingMode, SourceRef};
pub use result::ToolChainResult;
pub use step::{RetryPolicy, ToolChainStep};
pub use strategy::{ExecutionStrategy, StrategyKind};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::condition::StepCondition;
    pub use super::context::ToolChainExecutionContext;
    pub use super::error::{ChainError, Result};
    pub use super::orchestrator::{ChainReport, ChainRequest, ToolChainOrchestrator};
    pub use super::reference::{MappingMode, SourceRef};
    pub use super::result::ToolChainResult;
    pub use super::step::ToolChainStep;
    pub use super::strategy::{ExecutionStrategy, StrategyKind};
    pub use tc_core::{CancellationToken, ToolExecutor};
}
