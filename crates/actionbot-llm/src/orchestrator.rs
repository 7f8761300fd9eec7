//! Tool classification: which tools does a task need?

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use actionbot_types::{INVALID_TOOL_PREFIX, ToolSpec};

use crate::types::{ChatMessage, CompletionRequest};
use crate::{ChatModel, LlmError, Result};

/// Maps a conversation to the minimal set of tool names it needs.
///
/// Returns `None` when no specific tools are needed. An entry prefixed with
/// [`INVALID_TOOL_PREFIX`] names a capability no tool provides.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn required_tools(
        &self,
        messages: &[ChatMessage],
        exclude_confirmation: bool,
    ) -> Result<Option<Vec<String>>>;
}

const ORCHESTRATOR_PROMPT: &str = "You decide which tools an assistant needs to complete the \
user's request. Pick the smallest set of tools from the catalogue below. \
If the request needs a capability that no listed tool provides, include \
\"INVALID_TOOL:<short name>\" for it. If no tool is needed, return an empty list. \
Respond with a JSON object of the form {\"tools\": [\"name\", ...]}.";

#[derive(Debug, Deserialize)]
struct Answer {
    #[serde(default)]
    tools: Vec<String>,
}

/// Orchestrator backed by a JSON-mode completion over the tool catalogue.
pub struct LlmOrchestrator {
    model: Arc<dyn ChatModel>,
    model_name: Option<String>,
    catalogue: Vec<ToolSpec>,
}

impl LlmOrchestrator {
    pub fn new(model: Arc<dyn ChatModel>, catalogue: Vec<ToolSpec>) -> Self {
        Self {
            model,
            model_name: None,
            catalogue,
        }
    }

    /// Use a different (usually cheaper) model for classification.
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    fn system_prompt(&self, exclude_confirmation: bool) -> String {
        let mut prompt = format!("{ORCHESTRATOR_PROMPT}\n\nTools:\n");
        for spec in self.visible(exclude_confirmation) {
            prompt.push_str(&format!("- {}: {}\n", spec.name, spec.description));
        }
        prompt
    }

    fn visible(&self, exclude_confirmation: bool) -> impl Iterator<Item = &ToolSpec> {
        self.catalogue
            .iter()
            .filter(move |s| !(exclude_confirmation && s.requires_confirmation))
    }

    fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.catalogue.iter().find(|s| s.name == name)
    }

    /// Normalize the model's answer against the catalogue.
    fn interpret(&self, answer: Answer, exclude_confirmation: bool) -> Option<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for raw in answer.tools {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            let normalized = if name.starts_with(INVALID_TOOL_PREFIX) {
                name.to_string()
            } else {
                match self.spec(name) {
                    None => format!("{INVALID_TOOL_PREFIX}{name}"),
                    Some(spec) if exclude_confirmation && spec.requires_confirmation => continue,
                    Some(_) => name.to_string(),
                }
            };
            if !names.contains(&normalized) {
                names.push(normalized);
            }
        }
        if names.is_empty() { None } else { Some(names) }
    }
}

#[async_trait]
impl Orchestrator for LlmOrchestrator {
    async fn required_tools(
        &self,
        messages: &[ChatMessage],
        exclude_confirmation: bool,
    ) -> Result<Option<Vec<String>>> {
        let mut conversation = vec![ChatMessage::system(self.system_prompt(exclude_confirmation))];
        conversation.extend(
            messages
                .iter()
                .filter(|m| !matches!(m, ChatMessage::System { .. }))
                .cloned(),
        );

        let completion = self
            .model
            .complete(CompletionRequest {
                model: self.model_name.clone(),
                messages: conversation,
                tools: Vec::new(),
                json_mode: true,
            })
            .await?;

        let text = completion
            .message
            .text()
            .ok_or_else(|| LlmError::Unexpected("orchestrator returned no content".into()))?;
        let answer: Answer = serde_json::from_str(text.trim())?;
        let names = self.interpret(answer, exclude_confirmation);
        debug!(?names, "Orchestrator selected tools");
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Completion;
    use serde_json::json;
    use std::sync::Mutex;

    struct Fixed {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl ChatModel for Fixed {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
            self.seen.lock().unwrap().push(request);
            Ok(Completion {
                message: ChatMessage::assistant(self.reply.clone()),
                finish_reason: Some("stop".into()),
            })
        }
    }

    fn catalogue() -> Vec<ToolSpec> {
        let spec = |name: &str, confirm| ToolSpec {
            name: name.into(),
            description: format!("{name} tokens"),
            parameters: json!({ "type": "object" }),
            requires_confirmation: confirm,
        };
        vec![
            spec("transfer", false),
            spec("swap", false),
            spec("create_action", true),
        ]
    }

    fn orchestrator(reply: &str) -> (Arc<Fixed>, LlmOrchestrator) {
        let model = Arc::new(Fixed {
            reply: reply.into(),
            seen: Mutex::new(Vec::new()),
        });
        (model.clone(), LlmOrchestrator::new(model, catalogue()))
    }

    async fn ask(orch: &LlmOrchestrator) -> Option<Vec<String>> {
        orch.required_tools(&[ChatMessage::user("send 1 SOL to bob daily")], true)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_known_names_pass_through() {
        let (model, orch) = orchestrator(r#"{"tools":["transfer"]}"#);
        assert_eq!(ask(&orch).await, Some(vec!["transfer".to_string()]));

        let seen = model.seen.lock().unwrap();
        assert!(seen[0].json_mode);
        let system = seen[0].messages[0].text().unwrap();
        assert!(system.contains("- transfer"));
        assert!(!system.contains("- create_action"));
    }

    #[tokio::test]
    async fn test_unknown_name_becomes_sentinel() {
        let (_, orch) = orchestrator(r#"{"tools":["transfer","bridge"]}"#);
        assert_eq!(
            ask(&orch).await,
            Some(vec!["transfer".to_string(), "INVALID_TOOL:bridge".to_string()])
        );
    }

    #[tokio::test]
    async fn test_sentinel_kept() {
        let (_, orch) = orchestrator(r#"{"tools":["INVALID_TOOL:tweet"]}"#);
        assert_eq!(ask(&orch).await, Some(vec!["INVALID_TOOL:tweet".to_string()]));
    }

    #[tokio::test]
    async fn test_confirmation_tool_dropped_when_excluded() {
        let (_, orch) = orchestrator(r#"{"tools":["create_action"]}"#);
        assert_eq!(ask(&orch).await, None);

        let names = orch
            .required_tools(&[ChatMessage::user("remind me")], false)
            .await
            .unwrap();
        assert_eq!(names, Some(vec!["create_action".to_string()]));
    }

    #[tokio::test]
    async fn test_empty_list_is_none() {
        let (_, orch) = orchestrator(r#"{"tools":[]}"#);
        assert_eq!(ask(&orch).await, None);
    }

    #[tokio::test]
    async fn test_model_name_override() {
        let (model, orch) = orchestrator(r#"{"tools":["swap","swap"]}"#);
        let orch = orch.with_model_name("gpt-4o-mini");
        assert_eq!(ask(&orch).await, Some(vec!["swap".to_string()]));
        assert_eq!(
            model.seen.lock().unwrap()[0].model.as_deref(),
            Some("gpt-4o-mini")
        );
    }

    #[tokio::test]
    async fn test_malformed_answer_is_error() {
        let (_, orch) = orchestrator("transfer please");
        let err = orch
            .required_tools(&[ChatMessage::user("x")], true)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Json(_)));
    }
}
