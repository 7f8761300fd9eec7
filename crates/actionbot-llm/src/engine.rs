//! Bounded tool-calling loop.
//!
//! Each step sends the conversation plus the allowed tool specs to the model,
//! executes whatever tool calls come back, and feeds the results into the
//! next step. The loop ends when the model answers without calling a tool,
//! when every result of a step asks to suppress the follow-up, or when the
//! step bound is reached.
//!
//! Arguments that fail to parse or fail schema validation get exactly one
//! repair request. Calls to tools outside the allowed set are never repaired.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use actionbot_tools::{RegisteredTool, ToolContext, ToolSet};
use actionbot_types::ToolResult;

use crate::types::{ChatMessage, CompletionRequest, ToolCall};
use crate::{ChatModel, Result};

pub const DEFAULT_MAX_STEPS: usize = 15;

const REPAIR_PROMPT: &str = "You fix malformed tool-call arguments. \
Reply with a single JSON object containing only the corrected arguments. \
The object must conform to the given JSON Schema.";

/// Inputs of one loop run.
pub struct LoopRequest<'a> {
    pub system: String,
    pub instruction: String,
    pub tools: &'a ToolSet,
    pub ctx: &'a ToolContext,
}

/// What happened in a single model round-trip.
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    /// Calls as sent back to the model, with repaired arguments substituted.
    pub tool_calls: Vec<ToolCall>,
    /// `(call id, result)` for every call that actually ran.
    pub tool_results: Vec<(String, ToolResult)>,
    /// Names of tools whose arguments needed a repair request.
    pub repaired: Vec<String>,
    /// Names of tools that were called but never ran.
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoopOutcome {
    /// Messages produced by the run, excluding the system and user prompts.
    pub messages: Vec<ChatMessage>,
    pub steps: Vec<StepReport>,
}

impl LoopOutcome {
    /// True if any step ran at least one tool, whatever the tool reported.
    pub fn executed_any_tool(&self) -> bool {
        self.steps.iter().any(|s| !s.tool_results.is_empty())
    }

    /// Final assistant text, if the model ended with one.
    pub fn final_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| matches!(m, ChatMessage::Assistant { .. }))
            .and_then(|m| m.text())
    }
}

enum Prepared {
    Ready(Arc<RegisteredTool>, Value),
    Rejected(String),
}

pub struct ToolLoop {
    model: Arc<dyn ChatModel>,
    max_steps: usize,
}

impl ToolLoop {
    pub fn new(model: Arc<dyn ChatModel>, max_steps: usize) -> Self {
        Self {
            model,
            max_steps: max_steps.max(1),
        }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub async fn run(&self, request: LoopRequest<'_>) -> Result<LoopOutcome> {
        let mut conversation = vec![
            ChatMessage::system(request.system),
            ChatMessage::user(request.instruction),
        ];
        let specs = request.tools.specs();
        let mut outcome = LoopOutcome::default();

        for step in 0..self.max_steps {
            let completion = self
                .model
                .complete(CompletionRequest {
                    messages: conversation.clone(),
                    tools: specs.clone(),
                    ..Default::default()
                })
                .await?;

            let (content, calls) = match completion.message {
                ChatMessage::Assistant {
                    content,
                    tool_calls,
                } => (content, tool_calls),
                other => (other.text().map(str::to_string), Vec::new()),
            };

            if calls.is_empty() {
                debug!(step, "Model finished without tool calls");
                let message = ChatMessage::Assistant {
                    content,
                    tool_calls: Vec::new(),
                };
                conversation.push(message.clone());
                outcome.messages.push(message);
                break;
            }

            let mut report = StepReport::default();
            let mut tool_messages = Vec::with_capacity(calls.len());

            for mut call in calls {
                let name = call.function.name.clone();
                let prepared = self.prepare(&call, request.tools, &mut report).await?;

                let result = match prepared {
                    Prepared::Ready(tool, args) => {
                        call.function.arguments = args.to_string();
                        let result = match tool.execute(request.ctx, args).await {
                            Ok(result) => result,
                            Err(e) => {
                                warn!(tool = %name, error = %e, "Tool execution failed");
                                ToolResult::failure(e.to_string())
                            }
                        };
                        report.tool_results.push((call.id.clone(), result.clone()));
                        result
                    }
                    Prepared::Rejected(reason) => {
                        warn!(tool = %name, %reason, "Tool call rejected");
                        report.rejected.push(name.clone());
                        ToolResult::failure(reason)
                    }
                };

                tool_messages.push(ChatMessage::tool(
                    call.id.clone(),
                    serde_json::to_string(&result)?,
                ));
                report.tool_calls.push(call);
            }

            let assistant = ChatMessage::Assistant {
                content,
                tool_calls: report.tool_calls.clone(),
            };
            conversation.push(assistant.clone());
            outcome.messages.push(assistant);
            conversation.extend(tool_messages.iter().cloned());
            outcome.messages.extend(tool_messages);

            let suppress = !report.tool_results.is_empty()
                && report.tool_results.iter().all(|(_, r)| r.suppresses_follow_up());
            info!(
                step,
                executed = report.tool_results.len(),
                rejected = report.rejected.len(),
                repaired = report.repaired.len(),
                "Tool step finished"
            );
            outcome.steps.push(report);

            if suppress {
                debug!(step, "Tool results suppress follow-up, stopping");
                break;
            }
        }

        Ok(outcome)
    }

    /// Resolve the tool and produce schema-valid arguments, repairing once if needed.
    async fn prepare(
        &self,
        call: &ToolCall,
        tools: &ToolSet,
        report: &mut StepReport,
    ) -> Result<Prepared> {
        let name = &call.function.name;
        let Some(tool) = tools.get(name) else {
            return Ok(Prepared::Rejected(format!("No such tool: {name}")));
        };

        let problems = match parse_arguments(&call.function.arguments) {
            Ok(args) => match tool.validate(&args) {
                Ok(()) => return Ok(Prepared::Ready(tool.clone(), args)),
                Err(problems) => problems,
            },
            Err(e) => vec![format!("arguments are not valid JSON: {e}")],
        };

        debug!(tool = %name, ?problems, "Repairing tool arguments");
        report.repaired.push(name.clone());

        let Some(repaired) = self.repair(tool, &call.function.arguments, &problems).await? else {
            return Ok(Prepared::Rejected(format!(
                "Invalid arguments for {name}: {}",
                problems.join("; ")
            )));
        };

        match tool.validate(&repaired) {
            Ok(()) => Ok(Prepared::Ready(tool.clone(), repaired)),
            Err(still) => Ok(Prepared::Rejected(format!(
                "Invalid arguments for {name} after repair: {}",
                still.join("; ")
            ))),
        }
    }

    /// Single corrective request. `None` when the reply is not a JSON object.
    async fn repair(
        &self,
        tool: &RegisteredTool,
        arguments: &str,
        problems: &[String],
    ) -> Result<Option<Value>> {
        let spec = tool.spec();
        let prompt = format!(
            "Tool: {}\nMalformed arguments: {}\nProblems:\n- {}\nExpected parameter schema:\n{}",
            spec.name,
            arguments,
            problems.join("\n- "),
            serde_json::to_string_pretty(&spec.parameters)?,
        );

        let completion = self
            .model
            .complete(CompletionRequest {
                messages: vec![ChatMessage::system(REPAIR_PROMPT), ChatMessage::user(prompt)],
                json_mode: true,
                ..Default::default()
            })
            .await?;

        let repaired = completion
            .message
            .text()
            .and_then(|text| serde_json::from_str::<Value>(text.trim()).ok())
            .filter(Value::is_object);
        Ok(repaired)
    }
}

fn parse_arguments(raw: &str) -> std::result::Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw)
}
