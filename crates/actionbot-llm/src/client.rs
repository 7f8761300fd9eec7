//! OpenAI-compatible chat-completions client.
//!
//! Works against OpenAI, OpenRouter, Ollama and anything else that serves
//! `POST {base_url}/chat/completions` with function-style tools.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use actionbot_config::LlmConfig;
use actionbot_types::ToolSpec;

use crate::types::{ChatMessage, Completion, CompletionRequest, ToolCall};
use crate::{ChatModel, LlmError, Result};

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    /// Same endpoint and credentials, different default model.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn format_tools(tools: &[ToolSpec]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    fn build_body(&self, request: &CompletionRequest) -> Result<Value> {
        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": serde_json::to_value(&request.messages)?,
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(Self::format_tools(&request.tools));
        }
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request)?;

        let mut req = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let choice = parsed.choices.into_iter().next().ok_or(LlmError::EmptyResponse)?;
        let tool_calls = choice.message.tool_calls.unwrap_or_default();
        debug!(
            tool_calls = tool_calls.len(),
            finish_reason = ?choice.finish_reason,
            "Completion received"
        );

        Ok(Completion {
            message: ChatMessage::Assistant {
                content: choice.message.content.filter(|c| !c.is_empty()),
                tool_calls,
            },
            finish_reason: choice.finish_reason,
        })
    }
}
