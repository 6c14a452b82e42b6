//! Execution strategies
//!
//! The set of strategies is closed, so selection is an enum rather than a
//! trait object. Each strategy receives the run context and a cancellation
//! token and returns the results of every attempted step.

mod conditional;
mod parallel;
mod sequential;

pub use conditional::{determine_next_step, ConditionalStrategy};
pub use parallel::{group_steps_by_dependencies, ParallelStrategy};
pub use sequential::SequentialStrategy;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tc_core::{CancellationToken, ToolExecutor};

use crate::context::ToolChainExecutionContext;
use crate::error::{ChainError, Result};
use crate::result::ToolChainResult;

/// Strategy selector, parsed case-insensitively
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StrategyKind {
    #[default]
    Sequential,
    Parallel,
    Conditional,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Sequential => "sequential",
            StrategyKind::Parallel => "parallel",
            StrategyKind::Conditional => "conditional",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(StrategyKind::Sequential),
            "parallel" => Ok(StrategyKind::Parallel),
            "conditional" => Ok(StrategyKind::Conditional),
            _ => Err(ChainError::UnknownStrategy(s.to_string())),
        }
    }
}

impl TryFrom<String> for StrategyKind {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<StrategyKind> for String {
    fn from(kind: StrategyKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A ready-to-run strategy bound to an executor
pub enum ExecutionStrategy {
    Sequential(SequentialStrategy),
    Parallel(ParallelStrategy),
    Conditional(ConditionalStrategy),
}

impl ExecutionStrategy {
    pub fn new(kind: StrategyKind, executor: Arc<dyn ToolExecutor>) -> Self {
        match kind {
            StrategyKind::Sequential => {
                ExecutionStrategy::Sequential(SequentialStrategy::new(executor))
            }
            StrategyKind::Parallel => ExecutionStrategy::Parallel(ParallelStrategy::new(executor)),
            StrategyKind::Conditional => {
                ExecutionStrategy::Conditional(ConditionalStrategy::new(executor))
            }
        }
    }

    /// Resolve a strategy by name, as given in a chain request or on the command line
    pub fn from_name(name: &str, executor: Arc<dyn ToolExecutor>) -> Result<Self> {
        Ok(Self::new(name.parse()?, executor))
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            ExecutionStrategy::Sequential(_) => StrategyKind::Sequential,
            ExecutionStrategy::Parallel(_) => StrategyKind::Parallel,
            ExecutionStrategy::Conditional(_) => StrategyKind::Conditional,
        }
    }

    pub async fn execute(
        &self,
        context: &ToolChainExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolChainResult>> {
        match self {
            ExecutionStrategy::Sequential(s) => s.execute(context, cancel).await,
            ExecutionStrategy::Parallel(s) => s.execute(context, cancel).await,
            ExecutionStrategy::Conditional(s) => s.execute(context, cancel).await,
        }
    }
}
