//! Shared fixtures for processor and scheduler tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use actionbot_llm::{
    ChatMessage, ChatModel, Completion, CompletionRequest, LlmError, Orchestrator, ToolCall,
};
use actionbot_storage::{ActionStore, SqliteActionStore, StorageError};
use actionbot_tools::{ToolContext, ToolRegistry};
use actionbot_tools::tools::FnTool;
use actionbot_types::{
    Action, ActionUpdate, CREATE_ACTION_TOOL, Thread, ThreadMessage, ToolResult, ToolSpec, Wallet,
};

/// Replays canned assistant messages; answers with plain text once exhausted.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ChatMessage>>,
    /// Requests from this index on fail instead of replaying.
    fail_from: Option<usize>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ChatMessage>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fail_from: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Calls `tool` once, then errors on the follow-up request.
    pub fn calling_then_failing(tool: &str, arguments: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from([ChatMessage::Assistant {
                content: None,
                tool_calls: vec![ToolCall::new("call_1", tool, arguments)],
            }])),
            fail_from: Some(1),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Calls `tool` once, then finishes with text.
    pub fn calling(tool: &str, arguments: &str) -> Arc<Self> {
        Self::new(vec![
            ChatMessage::Assistant {
                content: None,
                tool_calls: vec![ToolCall::new("call_1", tool, arguments)],
            },
            ChatMessage::assistant("Done."),
        ])
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> actionbot_llm::Result<Completion> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };
        if self.fail_from.is_some_and(|from| index >= from) {
            return Err(LlmError::Api {
                status: 500,
                message: "upstream reset".into(),
            });
        }
        let message = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ChatMessage::assistant("Nothing to do."));
        Ok(Completion {
            message,
            finish_reason: None,
        })
    }
}

/// Answers by action description; unknown descriptions get `None`.
#[derive(Default)]
pub struct FixedOrchestrator {
    answers: HashMap<String, Vec<String>>,
    /// Descriptions that make the orchestrator panic.
    panics_on: Vec<String>,
    /// Descriptions that make the orchestrator error.
    fails_on: Vec<String>,
}

impl FixedOrchestrator {
    pub fn answering(description: &str, names: &[&str]) -> Self {
        Self::default().with(description, names)
    }

    pub fn with(mut self, description: &str, names: &[&str]) -> Self {
        self.answers.insert(
            description.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        );
        self
    }

    pub fn panicking_on(mut self, description: &str) -> Self {
        self.panics_on.push(description.to_string());
        self
    }

    pub fn failing_on(mut self, description: &str) -> Self {
        self.fails_on.push(description.to_string());
        self
    }
}

#[async_trait]
impl Orchestrator for FixedOrchestrator {
    async fn required_tools(
        &self,
        messages: &[ChatMessage],
        _exclude_confirmation: bool,
    ) -> actionbot_llm::Result<Option<Vec<String>>> {
        let description = messages.first().and_then(|m| m.text()).unwrap_or_default();
        if self.panics_on.iter().any(|d| d == description) {
            panic!("orchestrator exploded on {description}");
        }
        if self.fails_on.iter().any(|d| d == description) {
            return Err(LlmError::Api {
                status: 503,
                message: "overloaded".into(),
            });
        }
        Ok(self.answers.get(description).cloned())
    }
}

fn spec(name: &str, confirm: bool) -> ToolSpec {
    ToolSpec {
        name: name.into(),
        description: format!("{name} tool"),
        parameters: json!({
            "type": "object",
            "properties": { "amount": { "type": "number" } }
        }),
        requires_confirmation: confirm,
    }
}

fn ok(_: &ToolContext, _: Value) -> anyhow::Result<ToolResult> {
    Ok(ToolResult::ok(json!({ "signature": "5xyz" })))
}

fn explode(_: &ToolContext, _: Value) -> anyhow::Result<ToolResult> {
    panic!("transfer backend bug")
}

type Run = fn(&ToolContext, Value) -> anyhow::Result<ToolResult>;

fn build_registry(transfer: Run) -> Arc<ToolRegistry> {
    Arc::new(
        ToolRegistry::new(vec![
            Arc::new(FnTool::new(spec("transfer", false), transfer)),
            Arc::new(FnTool::new(spec("swap", false), ok)),
            Arc::new(FnTool::new(spec(CREATE_ACTION_TOOL, true), ok)),
        ])
        .unwrap(),
    )
}

/// `transfer` and `swap` plus a confirmation-gated `create_action`.
pub fn registry() -> Arc<ToolRegistry> {
    build_registry(ok)
}

/// Same tools as [`registry`], but `transfer` panics when run.
pub fn registry_with_panicking_transfer() -> Arc<ToolRegistry> {
    build_registry(explode)
}

/// In-memory store with one user, thread and primary wallet.
pub struct Fixture {
    pub store: Arc<SqliteActionStore>,
    pub thread: Thread,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = Arc::new(SqliteActionStore::open_in_memory().unwrap());
        let thread = store.create_thread("user-1", "DCA").await.unwrap();
        store
            .upsert_wallet(&Wallet {
                id: "w1".into(),
                user_id: "user-1".into(),
                public_key: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".into(),
                chain: "solana".into(),
                is_primary: true,
            })
            .await
            .unwrap();
        Self { store, thread }
    }

    /// Insert an action that is due now.
    pub async fn action(&self, id: &str, description: &str, tweak: impl FnOnce(&mut Action)) -> Action {
        let now = Utc::now();
        let mut action = Action {
            id: id.into(),
            user_id: "user-1".into(),
            thread_id: self.thread.id.clone(),
            description: description.into(),
            frequency: Some(3600),
            start_time: now - Duration::days(2),
            triggered: true,
            paused: false,
            completed: false,
            times_executed: 0,
            max_executions: None,
            last_executed_at: None,
            last_success_at: None,
            last_failure_at: None,
            created_at: now - Duration::days(2),
        };
        tweak(&mut action);
        self.store.insert_action(&action).await.unwrap();
        action
    }

    pub async fn reload(&self, id: &str) -> Action {
        self.store.get_action(id).await.unwrap().unwrap()
    }

    pub async fn messages(&self) -> Vec<ThreadMessage> {
        self.store.list_messages(&self.thread.id).await.unwrap()
    }
}

/// Delegates to an inner store but fails bookkeeping writes for chosen actions.
pub struct FailingUpdates {
    pub inner: Arc<SqliteActionStore>,
    pub fail_for: Vec<String>,
}

#[async_trait]
impl ActionStore for FailingUpdates {
    async fn list_active_actions(&self) -> actionbot_storage::Result<Vec<Action>> {
        self.inner.list_active_actions().await
    }

    async fn get_thread(&self, thread_id: &str) -> actionbot_storage::Result<Option<Thread>> {
        self.inner.get_thread(thread_id).await
    }

    async fn get_primary_wallet(&self, user_id: &str) -> actionbot_storage::Result<Option<Wallet>> {
        self.inner.get_primary_wallet(user_id).await
    }

    async fn update_action(
        &self,
        action_id: &str,
        update: &ActionUpdate,
    ) -> actionbot_storage::Result<()> {
        if self.fail_for.iter().any(|id| id == action_id) {
            return Err(StorageError::ActionNotFound(action_id.to_string()));
        }
        self.inner.update_action(action_id, update).await
    }

    async fn append_messages(
        &self,
        thread_id: &str,
        messages: &[ThreadMessage],
    ) -> actionbot_storage::Result<()> {
        self.inner.append_messages(thread_id, messages).await
    }
}

/// Delegates to an inner store but refuses to append thread messages.
pub struct FailingAppends {
    pub inner: Arc<SqliteActionStore>,
}

#[async_trait]
impl ActionStore for FailingAppends {
    async fn list_active_actions(&self) -> actionbot_storage::Result<Vec<Action>> {
        self.inner.list_active_actions().await
    }

    async fn get_thread(&self, thread_id: &str) -> actionbot_storage::Result<Option<Thread>> {
        self.inner.get_thread(thread_id).await
    }

    async fn get_primary_wallet(&self, user_id: &str) -> actionbot_storage::Result<Option<Wallet>> {
        self.inner.get_primary_wallet(user_id).await
    }

    async fn update_action(
        &self,
        action_id: &str,
        update: &ActionUpdate,
    ) -> actionbot_storage::Result<()> {
        self.inner.update_action(action_id, update).await
    }

    async fn append_messages(
        &self,
        thread_id: &str,
        _messages: &[ThreadMessage],
    ) -> actionbot_storage::Result<()> {
        Err(StorageError::ThreadNotFound(thread_id.to_string()))
    }
}
