//! Chain-level errors

use thiserror::Error;

use crate::result::ToolChainResult;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Invalid source reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Chain validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Unknown execution strategy: {0}")]
    UnknownStrategy(String),

    /// The run was cancelled; `completed` holds every result gathered before
    /// the halt, in the order the strategy produced them.
    #[error("Chain cancelled after {} step(s)", .completed.len())]
    Cancelled { completed: Vec<ToolChainResult> },

    #[error(transparent)]
    Core(#[from] tc_core::Error),
}

pub type Result<T> = std::result::Result<T, ChainError>;

impl ChainError {
    pub fn invalid_reference(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        ChainError::InvalidReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    pub fn cancelled(completed: Vec<ToolChainResult>) -> Self {
        ChainError::Cancelled { completed }
    }
}
