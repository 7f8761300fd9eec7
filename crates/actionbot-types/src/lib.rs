use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix the orchestrator puts in front of a tool name it could not resolve.
pub const INVALID_TOOL_PREFIX: &str = "INVALID_TOOL:";

/// Name of the tool that schedules new actions.
pub const CREATE_ACTION_TOOL: &str = "create_action";

// ──────────────────── Action Types ────────────────────

/// A recurring task bound to one user and one conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    /// Unique action ID.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Conversation thread the run output is appended to.
    pub thread_id: String,
    /// Natural-language instruction handed to the model as the prompt.
    pub description: String,
    /// Seconds between runs. `None` or `0` means not recurring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<i64>,
    /// Execution must not begin before this instant.
    pub start_time: DateTime<Utc>,
    /// Must be true for the action to be considered at all.
    pub triggered: bool,
    pub paused: bool,
    pub completed: bool,
    /// Number of processed runs. Never reset.
    pub times_executed: i64,
    /// Optional cap on runs. `None` or `0` means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_executions: Option<i64>,
    /// Most recent processing attempt, successful or not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Action {
    /// Frequency in seconds, if the action recurs at all.
    pub fn recurrence_secs(&self) -> Option<i64> {
        self.frequency.filter(|f| *f > 0)
    }

    /// Execution cap, treating `0` as unlimited.
    pub fn execution_cap(&self) -> Option<i64> {
        self.max_executions.filter(|m| *m > 0)
    }
}

/// Input for scheduling a new action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAction {
    pub user_id: String,
    pub thread_id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_executions: Option<i64>,
}

/// Bookkeeping fields written back after a run.
///
/// `None` on an optional timestamp means "leave the stored value alone".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionUpdate {
    pub times_executed: i64,
    pub last_executed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    pub paused: bool,
    pub completed: bool,
}

// ──────────────────── Thread Types ────────────────────

/// A conversation thread owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thread {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Role tag of a thread message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(MessageRole::System),
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "tool" => Some(MessageRole::Tool),
            _ => None,
        }
    }
}

/// One entry of a thread's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadMessage {
    pub id: String,
    pub thread_id: String,
    pub role: MessageRole,
    /// Role-specific payload (text, tool calls, tool results).
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ──────────────────── Wallet Types ────────────────────

/// A user's wallet. Only the public key is ever handled here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub id: String,
    pub user_id: String,
    pub public_key: String,
    #[serde(default = "default_chain")]
    pub chain: String,
    #[serde(default)]
    pub is_primary: bool,
}

fn default_chain() -> String {
    "solana".to_string()
}

// ──────────────────── Tool Types ────────────────────

/// Description of a tool as advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool's arguments.
    pub parameters: serde_json::Value,
    /// Tool needs an interactive user confirmation before it may run.
    #[serde(default)]
    pub requires_confirmation: bool,
}

/// Uniform envelope every tool execution returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_transaction: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppress_follow_up: Option<bool>,
}

impl ToolResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn suppresses_follow_up(&self) -> bool {
        self.suppress_follow_up.unwrap_or(false)
    }
}
