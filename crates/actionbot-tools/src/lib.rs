//! actionbot-tools: tool contract, registry, run-time tool selection and built-in tools.
//!
//! Provides:
//! - The [`ActionTool`] trait every tool implements
//! - An immutable [`ToolRegistry`] with per-tool JSON Schema validators
//! - Read-only [`ToolSet`] views used to restrict what a single run may call
//! - Selection of the run's tool set from the orchestrator's answer
//! - Built-in tools (`create_action`, `token_price`, `wallet_address`)

pub mod context;
pub mod registry;
pub mod selection;
pub mod tools;

use async_trait::async_trait;
use serde_json::Value;

use actionbot_types::{ToolResult, ToolSpec};

pub use context::ToolContext;
pub use registry::{RegisteredTool, ToolError, ToolRegistry, ToolSet};
pub use selection::ToolSelection;

/// A named, schema-validated capability the model can invoke.
#[async_trait]
pub trait ActionTool: Send + Sync {
    /// Name, description and parameter schema.
    fn spec(&self) -> &ToolSpec;

    /// Run the tool with arguments that already passed schema validation.
    async fn execute(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<ToolResult>;
}
