//! `wallet_address` tool: report the wallet the run acts for.

use async_trait::async_trait;
use serde_json::{Value, json};

use actionbot_types::{ToolResult, ToolSpec};

use crate::{ActionTool, ToolContext};

pub struct WalletAddressTool {
    spec: ToolSpec,
}

impl WalletAddressTool {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec {
                name: "wallet_address".to_string(),
                description: "Get the public address of the user's primary wallet.".to_string(),
                parameters: json!({ "type": "object", "properties": {} }),
                requires_confirmation: false,
            },
        }
    }
}

impl Default for WalletAddressTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionTool for WalletAddressTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &ToolContext, _args: Value) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::ok(json!({ "address": ctx.wallet_public_key })))
    }
}
