//! `token_price` tool: look up USD prices for token mints.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use actionbot_types::{ToolResult, ToolSpec};

use crate::{ActionTool, ToolContext};

#[derive(Debug, Deserialize)]
struct TokenPriceParams {
    mints: Vec<String>,
}

pub struct TokenPriceTool {
    http: reqwest::Client,
    api_url: String,
    spec: ToolSpec,
}

impl TokenPriceTool {
    pub fn new(http: reqwest::Client, api_url: String) -> Self {
        let spec = ToolSpec {
            name: "token_price".to_string(),
            description: "Get the current USD price of one or more tokens by mint address."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "mints": {
                        "type": "array",
                        "items": { "type": "string", "minLength": 1 },
                        "minItems": 1,
                        "description": "Token mint addresses."
                    }
                },
                "required": ["mints"]
            }),
            requires_confirmation: false,
        };
        Self { http, api_url, spec }
    }
}

#[async_trait]
impl ActionTool for TokenPriceTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, _ctx: &ToolContext, args: Value) -> anyhow::Result<ToolResult> {
        let params: TokenPriceParams =
            serde_json::from_value(args).context("Invalid token_price arguments")?;

        let response = self
            .http
            .get(&self.api_url)
            .query(&[("ids", params.mints.join(","))])
            .send()
            .await
            .context("Price API request failed")?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "Price API returned an error");
            return Ok(ToolResult::failure(format!("Price API returned {status}")));
        }

        let body: Value = response.json().await.context("Price API sent invalid JSON")?;
        let prices = body.get("data").cloned().unwrap_or(body);
        Ok(ToolResult::ok(prices))
    }
}
