//! Tool Chain Execution Context
//!
//! Per-run state handed to a strategy:
//! - The ordered steps and run correlation ids
//! - Reasoning settings and the shared reasoning trace
//! - Intermediate results observed as steps complete
//! - Global parameters and the mapping mode

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tc_core::{Parameters, RunContext};
use tokio::sync::RwLock;

use crate::reference::MappingMode;
use crate::step::ToolChainStep;

/// Reasoning budget used when a run does not set one
pub const DEFAULT_MAX_REASONING_STEPS: usize = 5;

/// One thought/action/observation entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub thought: String,
    pub action: String,
    pub observation: String,
    pub timestamp: DateTime<Utc>,
}

impl ReasoningStep {
    pub fn new(
        thought: impl Into<String>,
        action: impl Into<String>,
        observation: impl Into<String>,
    ) -> Self {
        Self {
            thought: thought.into(),
            action: action.into(),
            observation: observation.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Output of a step as it completed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntermediateResult {
    pub step_id: String,
    pub output: Value,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only log shared by concurrently running steps.
///
/// Clones share the same entries.
#[derive(Debug)]
pub struct SharedLog<T> {
    entries: Arc<RwLock<Vec<T>>>,
}

impl<T> Clone for SharedLog<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for SharedLog<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<T: Clone> SharedLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its index
    pub async fn push(&self, entry: T) -> usize {
        let mut entries = self.entries.write().await;
        entries.push(entry);
        entries.len() - 1
    }

    /// Modify the entry at `index` in place; false if there is none
    pub async fn update<F>(&self, index: usize, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        let mut entries = self.entries.write().await;
        match entries.get_mut(index) {
            Some(entry) => {
                f(entry);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<T> {
        self.entries.read().await.clone()
    }
}

/// Everything a strategy needs for one run
#[derive(Debug, Clone)]
pub struct ToolChainExecutionContext {
    pub steps: Vec<ToolChainStep>,
    pub run: RunContext,
    pub enable_reasoning: bool,
    pub max_reasoning_steps: usize,
    pub mapping_mode: MappingMode,
    /// Lowest-precedence parameters applied to every step
    pub global_parameters: Parameters,
    /// One entry per step the strategy tried to start. A step refused
    /// because the run was cancelled keeps its entry, marked with
    /// `runner::REFUSED_OBSERVATION`, and has no result.
    pub reasoning_steps: SharedLog<ReasoningStep>,
    pub intermediate_results: SharedLog<IntermediateResult>,
}

impl ToolChainExecutionContext {
    pub fn new(steps: Vec<ToolChainStep>) -> Self {
        Self {
            steps,
            run: RunContext::new(),
            enable_reasoning: false,
            max_reasoning_steps: DEFAULT_MAX_REASONING_STEPS,
            mapping_mode: MappingMode::default(),
            global_parameters: Parameters::new(),
            reasoning_steps: SharedLog::new(),
            intermediate_results: SharedLog::new(),
        }
    }

    /// Enable the reasoning trace with the given budget
    pub fn with_reasoning(mut self, max_reasoning_steps: usize) -> Self {
        self.enable_reasoning = true;
        self.max_reasoning_steps = max_reasoning_steps;
        self
    }

    pub fn with_run(mut self, run: RunContext) -> Self {
        self.run = run;
        self
    }

    pub fn with_mapping_mode(mut self, mode: MappingMode) -> Self {
        self.mapping_mode = mode;
        self
    }

    pub fn with_global_parameters(mut self, parameters: Parameters) -> Self {
        self.global_parameters = parameters;
        self
    }

    pub fn execution_id(&self) -> &str {
        &self.run.execution_id
    }

    pub fn step(&self, step_id: &str) -> Option<&ToolChainStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}
