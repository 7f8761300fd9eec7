//! Built-in tool implementations.
//!
//! Each tool implements `ActionTool`. Tools that need shared state (store,
//! HTTP client) receive it at construction time.

pub mod create_action;
pub mod token_price;
pub mod wallet_address;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use actionbot_config::ToolsConfig;
use actionbot_storage::SqliteActionStore;
use actionbot_types::{ToolResult, ToolSpec};

use crate::{ActionTool, ToolContext};

/// Create all built-in tools.
pub fn create_builtin_tools(
    store: Arc<SqliteActionStore>,
    http: reqwest::Client,
    config: &ToolsConfig,
) -> Vec<Arc<dyn ActionTool>> {
    vec![
        Arc::new(create_action::CreateActionTool::new(store)),
        Arc::new(token_price::TokenPriceTool::new(http, config.price_api_url.clone())),
        Arc::new(wallet_address::WalletAddressTool::new()),
    ]
}

type ToolFn = dyn Fn(&ToolContext, Value) -> anyhow::Result<ToolResult> + Send + Sync;

/// A tool backed by a synchronous closure.
pub struct FnTool {
    spec: ToolSpec,
    run: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(spec: ToolSpec, run: F) -> Self
    where
        F: Fn(&ToolContext, Value) -> anyhow::Result<ToolResult> + Send + Sync + 'static,
    {
        Self {
            spec,
            run: Box::new(run),
        }
    }
}

#[async_trait]
impl ActionTool for FnTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<ToolResult> {
        (self.run)(ctx, args)
    }
}
