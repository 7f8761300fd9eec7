//! `create_action` tool: schedule a recurring action from chat.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use actionbot_storage::SqliteActionStore;
use actionbot_types::{CREATE_ACTION_TOOL, NewAction, ToolResult, ToolSpec};

use crate::{ActionTool, ToolContext};

/// Shortest supported interval between runs.
pub const MIN_FREQUENCY_SECS: i64 = 900;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateActionParams {
    description: String,
    frequency: i64,
    #[serde(default)]
    max_executions: Option<i64>,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
}

/// Schedules a new action on behalf of the user.
///
/// Only interactive callers may use it. Scheduled runs never see it: tool
/// assembly strips it from every run's tool set, and `execute` refuses a
/// scheduled context. It stays registered so the orchestrator catalogue
/// lists it as confirmation-gated and the strip has a real entry to act on.
pub struct CreateActionTool {
    store: Arc<SqliteActionStore>,
    spec: ToolSpec,
}

impl CreateActionTool {
    pub fn new(store: Arc<SqliteActionStore>) -> Self {
        let spec = ToolSpec {
            name: CREATE_ACTION_TOOL.to_string(),
            description: "Schedule a recurring action. The description is run as a prompt every \
                          `frequency` seconds until `maxExecutions` runs have happened."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "description": {
                        "type": "string",
                        "minLength": 1,
                        "description": "What to do on every run, phrased as an instruction."
                    },
                    "frequency": {
                        "type": "integer",
                        "minimum": MIN_FREQUENCY_SECS,
                        "description": "Seconds between runs (at least 900)."
                    },
                    "maxExecutions": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Stop after this many runs. 0 or absent means unlimited."
                    },
                    "startTime": {
                        "type": "string",
                        "description": "RFC 3339 instant before which the action must not run."
                    }
                },
                "required": ["description", "frequency"]
            }),
            requires_confirmation: true,
        };
        Self { store, spec }
    }
}

#[async_trait]
impl ActionTool for CreateActionTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> anyhow::Result<ToolResult> {
        if ctx.is_scheduled() {
            return Ok(ToolResult::failure(
                "Actions cannot be scheduled from within a scheduled run",
            ));
        }

        let params: CreateActionParams =
            serde_json::from_value(args).context("Invalid create_action arguments")?;

        let action = self
            .store
            .create_action(NewAction {
                user_id: ctx.user_id.clone(),
                thread_id: ctx.thread_id.clone(),
                description: params.description,
                frequency: Some(params.frequency),
                start_time: params.start_time,
                max_executions: params.max_executions,
            })
            .await?;

        tracing::info!(action_id = %action.id, user_id = %action.user_id, "Action scheduled");

        Ok(ToolResult {
            success: true,
            data: Some(json!({
                "id": action.id,
                "description": action.description,
                "frequency": action.frequency,
                "startTime": action.start_time,
                "maxExecutions": action.max_executions,
            })),
            suppress_follow_up: Some(true),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_ctx(thread_id: &str) -> ToolContext {
        ToolContext {
            user_id: "user-1".into(),
            thread_id: thread_id.into(),
            wallet_public_key: "KEY".into(),
            action_id: None,
        }
    }

    #[tokio::test]
    async fn test_creates_action_in_store() {
        let store = Arc::new(SqliteActionStore::open_in_memory().unwrap());
        let thread = store.create_thread("user-1", "t").await.unwrap();
        let tool = CreateActionTool::new(store.clone());

        let result = tool
            .execute(
                &chat_ctx(&thread.id),
                json!({ "description": "Check SOL", "frequency": 3600, "maxExecutions": 4 }),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.suppresses_follow_up());

        let id = result.data.unwrap()["id"].as_str().unwrap().to_string();
        let action = store.get_action(&id).await.unwrap().unwrap();
        assert_eq!(action.thread_id, thread.id);
        assert_eq!(action.frequency, Some(3600));
        assert_eq!(action.max_executions, Some(4));
        assert!(action.triggered);
    }

    #[tokio::test]
    async fn test_refuses_inside_scheduled_run() {
        let store = Arc::new(SqliteActionStore::open_in_memory().unwrap());
        let tool = CreateActionTool::new(store.clone());
        let ctx = ToolContext::for_action("act-1", "user-1", "thread-1", "KEY");

        let result = tool
            .execute(&ctx, json!({ "description": "loop", "frequency": 900 }))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(store.list_actions().await.unwrap().is_empty());
    }

    #[test]
    fn test_requires_confirmation() {
        let store = Arc::new(SqliteActionStore::open_in_memory().unwrap());
        assert!(CreateActionTool::new(store).spec().requires_confirmation);
    }
}
