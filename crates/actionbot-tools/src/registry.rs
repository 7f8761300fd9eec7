//! Immutable tool registry and the read-only views a run is restricted to.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use actionbot_types::{ToolResult, ToolSpec};

use crate::{ActionTool, ToolContext};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool '{0}' registered twice")]
    Duplicate(String),
    #[error("Tool '{tool}' has an invalid parameter schema: {message}")]
    InvalidSchema { tool: String, message: String },
}

/// A tool together with its compiled argument validator.
pub struct RegisteredTool {
    tool: Arc<dyn ActionTool>,
    validator: jsonschema::Validator,
}

impl RegisteredTool {
    fn new(tool: Arc<dyn ActionTool>) -> Result<Self, ToolError> {
        let validator =
            jsonschema::validator_for(&tool.spec().parameters).map_err(|e| ToolError::InvalidSchema {
                tool: tool.spec().name.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { tool, validator })
    }

    pub fn name(&self) -> &str {
        &self.tool.spec().name
    }

    pub fn spec(&self) -> &ToolSpec {
        self.tool.spec()
    }

    /// Check arguments against the parameter schema, collecting every violation.
    pub fn validate(&self, args: &Value) -> Result<(), Vec<String>> {
        let problems: Vec<String> = self
            .validator
            .iter_errors(args)
            .map(|e| e.to_string())
            .collect();
        if problems.is_empty() { Ok(()) } else { Err(problems) }
    }

    pub async fn execute(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<ToolResult> {
        self.tool.execute(ctx, args).await
    }
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.name())
            .finish()
    }
}

/// Process-wide map from tool name to tool. Built once, never mutated.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<RegisteredTool>>,
}

impl ToolRegistry {
    /// Compile every tool's schema and index it by name.
    pub fn new(tools: Vec<Arc<dyn ActionTool>>) -> Result<Self, ToolError> {
        let mut map = BTreeMap::new();
        for tool in tools {
            let registered = RegisteredTool::new(tool)?;
            let name = registered.name().to_string();
            if map.contains_key(&name) {
                return Err(ToolError::Duplicate(name));
            }
            map.insert(name, Arc::new(registered));
        }
        tracing::debug!(count = map.len(), "Tool registry built");
        Ok(Self { tools: map })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredTool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// A view over every registered tool.
    pub fn all(&self) -> ToolSet {
        ToolSet {
            tools: self.tools.clone(),
        }
    }
}

/// Read-only subset of the registry. Narrowing always produces a new view.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    tools: BTreeMap<String, Arc<RegisteredTool>>,
}

impl ToolSet {
    /// Keep only the named tools. Names the set does not know are ignored.
    pub fn restrict<S: AsRef<str>>(&self, names: &[S]) -> ToolSet {
        let tools = names
            .iter()
            .filter_map(|n| {
                self.tools
                    .get_key_value(n.as_ref())
                    .map(|(k, v)| (k.clone(), v.clone()))
            })
            .collect();
        ToolSet { tools }
    }

    /// Drop a single tool.
    pub fn without(&self, name: &str) -> ToolSet {
        ToolSet {
            tools: self
                .tools
                .iter()
                .filter(|(k, _)| k.as_str() != name)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Drop every tool that needs an interactive confirmation.
    pub fn without_confirmation(&self) -> ToolSet {
        ToolSet {
            tools: self
                .tools
                .iter()
                .filter(|(_, t)| !t.spec().requires_confirmation)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredTool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
