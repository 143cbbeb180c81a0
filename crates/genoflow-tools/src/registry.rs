use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use genoflow_core::config::ToolsConfig;
use genoflow_core::error::{GenoflowError, Result};
use genoflow_core::traits::{Capability, CapabilityRegistry};
use genoflow_core::types::JsonMap;

use crate::samtools::{SamtoolsCommand, SamtoolsTool};

/// Registry of available capabilities.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Capability>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a capability, replacing any with the same name.
    pub fn register(&mut self, tool: impl Capability) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Unregister a capability by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.tools.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// `(name, description)` pairs, sorted by name.
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.tools
            .values()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect()
    }

    /// Execute a capability by name under its timeout.
    pub async fn execute(&self, name: &str, params: JsonMap) -> Result<Value> {
        let tool = self.get_capability(name)?;
        let timeout = std::time::Duration::from_secs(tool.timeout_secs());

        debug!(tool = %name, "Executing capability");
        match tokio::time::timeout(timeout, tool.execute(params)).await {
            Ok(result) => result,
            Err(_) => Err(GenoflowError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        }
    }

    /// Create a registry with the samtools capabilities registered.
    pub fn with_builtins(config: &ToolsConfig) -> Self {
        let mut registry = Self::new();
        registry.register(SamtoolsTool::new(SamtoolsCommand::View, config));
        registry.register(SamtoolsTool::new(SamtoolsCommand::Stats, config));
        registry.register(SamtoolsTool::new(SamtoolsCommand::Index, config));
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry for ToolRegistry {
    fn get_capability(&self, name: &str) -> Result<Arc<dyn Capability>> {
        self.get(name)
            .ok_or_else(|| GenoflowError::ToolNotFound(name.to_string()))
    }
}
