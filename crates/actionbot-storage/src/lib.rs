//! actionbot-storage: persistence for actions, threads, messages and wallets.
//!
//! The scheduler only talks to the [`ActionStore`] trait; [`SqliteActionStore`]
//! is the bundled implementation.

mod sqlite;

use async_trait::async_trait;

use actionbot_types::{Action, ActionUpdate, Thread, ThreadMessage, Wallet};

pub use sqlite::SqliteActionStore;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Action not found: {0}")]
    ActionNotFound(String),
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Query surface the scheduler needs from the backing store.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Actions with `triggered = true`, `completed = false`, `paused = false`.
    async fn list_active_actions(&self) -> Result<Vec<Action>>;

    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>>;

    /// The user's primary wallet, if one is registered.
    async fn get_primary_wallet(&self, user_id: &str) -> Result<Option<Wallet>>;

    /// Write the bookkeeping fields of a single action.
    async fn update_action(&self, action_id: &str, update: &ActionUpdate) -> Result<()>;

    /// Append messages to a thread's log.
    async fn append_messages(&self, thread_id: &str, messages: &[ThreadMessage]) -> Result<()>;
}
