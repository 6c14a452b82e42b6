//! Tool Registry
//!
//! Holds the tools chain steps can reference by id, with per-tool usage
//! counters. Also serves as the `ToolCatalog` used to validate chains.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tc_core::{ToolCatalog, ToolDefinition};
use tokio::sync::RwLock;
use tracing::debug;

use crate::tool::BoxedTool;

/// A registered tool with usage tracking
struct RegisteredTool {
    tool: BoxedTool,
    definition: ToolDefinition,
    use_count: AtomicU64,
}

/// Statistics about the registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_registered: usize,
    pub total_lookups: u64,
    pub misses: u64,
    pub uses_by_tool: HashMap<String, u64>,
}

/// Tool Registry
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<Arc<str>, Arc<RegisteredTool>>>,
    lookups: AtomicU64,
    misses: AtomicU64,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name. Names must be unique.
    pub async fn register_tool(&self, tool: BoxedTool) -> Result<()> {
        let definition = tool.definition();
        self.register(Arc::from(tool.name()), tool, definition).await
    }

    /// Register a tool with an explicit name and definition
    pub async fn register(
        &self,
        name: Arc<str>,
        tool: BoxedTool,
        definition: ToolDefinition,
    ) -> Result<()> {
        let mut tools = self.tools.write().await;
        if tools.contains_key(&name) {
            bail!("Tool already registered: {}", name);
        }

        tools.insert(
            name.clone(),
            Arc::new(RegisteredTool {
                tool,
                definition,
                use_count: AtomicU64::new(0),
            }),
        );

        debug!("Registered tool: {}", name);
        Ok(())
    }

    /// Look up a tool for execution; counts as a use
    pub async fn get(&self, name: &str) -> Option<BoxedTool> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let tools = self.tools.read().await;
        match tools.get(name) {
            Some(registered) => {
                registered.use_count.fetch_add(1, Ordering::Relaxed);
                Some(registered.tool.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn get_definition(&self, name: &str) -> Option<ToolDefinition> {
        let tools = self.tools.read().await;
        tools.get(name).map(|t| t.definition.clone())
    }

    /// All registered definitions, sorted by name
    pub async fn list(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read().await;
        let mut definitions: Vec<_> = tools.values().map(|t| t.definition.clone()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    pub async fn unregister(&self, name: &str) -> bool {
        let removed = self.tools.write().await.remove(name).is_some();
        if removed {
            debug!("Unregistered tool: {}", name);
        }
        removed
    }

    pub async fn stats(&self) -> RegistryStats {
        let tools = self.tools.read().await;
        RegistryStats {
            total_registered: tools.len(),
            total_lookups: self.lookups.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            uses_by_tool: tools
                .iter()
                .map(|(name, t)| (name.to_string(), t.use_count.load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

#[async_trait]
impl ToolCatalog for ToolRegistry {
    async fn tool_definition(&self, tool_id: &str) -> Option<ToolDefinition> {
        self.get_definition(tool_id).await
    }
}
