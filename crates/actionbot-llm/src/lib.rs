//! actionbot-llm: model access for scheduled runs.
//!
//! Provides:
//! - Chat message types matching the OpenAI chat-completions wire format
//! - The [`ChatModel`] trait and an OpenAI-compatible HTTP client
//! - The bounded tool-calling loop with single-shot argument repair
//! - The orchestrator that maps a task description to the tools it needs

pub mod client;
pub mod engine;
pub mod orchestrator;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use client::OpenAiClient;
pub use engine::{LoopOutcome, LoopRequest, StepReport, ToolLoop};
pub use orchestrator::{LlmOrchestrator, Orchestrator};
pub use types::{ChatMessage, Completion, CompletionRequest, FunctionCall, ToolCall};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Model returned no choices")]
    EmptyResponse,
    #[error("Unexpected model output: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;

/// A chat-completion capable model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}
