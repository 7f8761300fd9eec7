//! SQLite-backed [`ActionStore`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tokio::sync::Mutex;

use actionbot_types::{
    Action, ActionUpdate, MessageRole, NewAction, Thread, ThreadMessage, Wallet,
};

use crate::{ActionStore, Result, StorageError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS threads (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        thread_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY (thread_id) REFERENCES threads(id)
    );

    CREATE INDEX IF NOT EXISTS idx_messages_thread
        ON messages(thread_id, created_at);

    CREATE TABLE IF NOT EXISTS actions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        thread_id TEXT NOT NULL,
        description TEXT NOT NULL,
        frequency INTEGER,
        start_time TEXT NOT NULL,
        triggered INTEGER NOT NULL DEFAULT 1,
        paused INTEGER NOT NULL DEFAULT 0,
        completed INTEGER NOT NULL DEFAULT 0,
        times_executed INTEGER NOT NULL DEFAULT 0,
        max_executions INTEGER,
        last_executed_at TEXT,
        last_success_at TEXT,
        last_failure_at TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS wallets (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        public_key TEXT NOT NULL,
        chain TEXT NOT NULL,
        is_primary INTEGER NOT NULL DEFAULT 0
    );";

const ACTION_COLUMNS: &str = "id, user_id, thread_id, description, frequency, start_time, triggered, \
     paused, completed, times_executed, max_executions, last_executed_at, last_success_at, \
     last_failure_at, created_at";

/// SQLite-based storage for actions and their conversation threads.
pub struct SqliteActionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteActionStore {
    /// Open (or create) the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL lets the cron handler read while a run writes
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Storage opened: {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await?
    }

    // ─── Threads ────────────────────────────────────────────

    /// Create a new conversation thread.
    pub async fn create_thread(&self, user_id: &str, title: &str) -> Result<Thread> {
        let thread = Thread {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        let row = thread.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO threads (id, user_id, title, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![row.id, row.user_id, row.title, fmt_ts(&row.created_at)],
            )?;
            Ok(())
        })
        .await?;
        Ok(thread)
    }

    /// All messages of a thread in insertion-time order.
    pub async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let thread_id = thread_id.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, thread_id, role, content, created_at FROM messages
                 WHERE thread_id = ?1 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map(params![thread_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    // ─── Actions ────────────────────────────────────────────

    /// Schedule a new action with creation defaults.
    pub async fn create_action(&self, new: NewAction) -> Result<Action> {
        let now = Utc::now();
        let action = Action {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new.user_id,
            thread_id: new.thread_id,
            description: new.description,
            frequency: new.frequency,
            start_time: new.start_time.unwrap_or(now),
            triggered: true,
            paused: false,
            completed: false,
            times_executed: 0,
            max_executions: new.max_executions,
            last_executed_at: None,
            last_success_at: None,
            last_failure_at: None,
            created_at: now,
        };
        self.insert_action(&action).await?;
        Ok(action)
    }

    /// Insert a fully specified action row.
    pub async fn insert_action(&self, action: &Action) -> Result<()> {
        let a = action.clone();
        self.blocking(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO actions ({ACTION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
                ),
                params![
                    a.id,
                    a.user_id,
                    a.thread_id,
                    a.description,
                    a.frequency,
                    fmt_ts(&a.start_time),
                    a.triggered as i32,
                    a.paused as i32,
                    a.completed as i32,
                    a.times_executed,
                    a.max_executions,
                    a.last_executed_at.as_ref().map(fmt_ts),
                    a.last_success_at.as_ref().map(fmt_ts),
                    a.last_failure_at.as_ref().map(fmt_ts),
                    fmt_ts(&a.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Get an action by ID.
    pub async fn get_action(&self, id: &str) -> Result<Option<Action>> {
        let id = id.to_string();
        self.blocking(move |conn| {
            let result = conn
                .query_row(
                    &format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = ?1"),
                    params![id],
                    map_action,
                )
                .optional()?;
            Ok(result)
        })
        .await
    }

    /// List every action, newest first.
    pub async fn list_actions(&self) -> Result<Vec<Action>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACTION_COLUMNS} FROM actions ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([], map_action)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Set or clear the paused flag. This is the only way a paused action resumes.
    pub async fn set_paused(&self, id: &str, paused: bool) -> Result<()> {
        let id = id.to_string();
        self.blocking(move |conn| {
            let count = conn.execute(
                "UPDATE actions SET paused = ?1 WHERE id = ?2",
                params![paused as i32, id],
            )?;
            if count == 0 {
                return Err(StorageError::ActionNotFound(id));
            }
            Ok(())
        })
        .await
    }

    // ─── Wallets ────────────────────────────────────────────

    /// Insert or update a wallet. Marking it primary demotes the user's other wallets.
    pub async fn upsert_wallet(&self, wallet: &Wallet) -> Result<()> {
        let w = wallet.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            if w.is_primary {
                tx.execute(
                    "UPDATE wallets SET is_primary = 0 WHERE user_id = ?1 AND id != ?2",
                    params![w.user_id, w.id],
                )?;
            }
            tx.execute(
                "INSERT INTO wallets (id, user_id, public_key, chain, is_primary)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    user_id = excluded.user_id,
                    public_key = excluded.public_key,
                    chain = excluded.chain,
                    is_primary = excluded.is_primary",
                params![w.id, w.user_id, w.public_key, w.chain, w.is_primary as i32],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ActionStore for SqliteActionStore {
    async fn list_active_actions(&self) -> Result<Vec<Action>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACTION_COLUMNS} FROM actions
                 WHERE triggered = 1 AND completed = 0 AND paused = 0"
            ))?;
            let rows = stmt
                .query_map([], map_action)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>> {
        let thread_id = thread_id.to_string();
        self.blocking(move |conn| {
            let result = conn
                .query_row(
                    "SELECT id, user_id, title, created_at FROM threads WHERE id = ?1",
                    params![thread_id],
                    |row| {
                        Ok(Thread {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            title: row.get(2)?,
                            created_at: parse_ts(row, 3)?,
                        })
                    },
                )
                .optional()?;
            Ok(result)
        })
        .await
    }

    async fn get_primary_wallet(&self, user_id: &str) -> Result<Option<Wallet>> {
        let user_id = user_id.to_string();
        self.blocking(move |conn| {
            let result = conn
                .query_row(
                    "SELECT id, user_id, public_key, chain, is_primary FROM wallets
                     WHERE user_id = ?1 AND is_primary = 1 LIMIT 1",
                    params![user_id],
                    |row| {
                        Ok(Wallet {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            public_key: row.get(2)?,
                            chain: row.get(3)?,
                            is_primary: row.get::<_, i32>(4)? != 0,
                        })
                    },
                )
                .optional()?;
            Ok(result)
        })
        .await
    }

    async fn update_action(&self, action_id: &str, update: &ActionUpdate) -> Result<()> {
        let id = action_id.to_string();
        let u = update.clone();
        self.blocking(move |conn| {
            let count = conn.execute(
                "UPDATE actions SET
                    times_executed = ?1,
                    last_executed_at = ?2,
                    last_success_at = COALESCE(?3, last_success_at),
                    last_failure_at = COALESCE(?4, last_failure_at),
                    paused = ?5,
                    completed = ?6
                 WHERE id = ?7",
                params![
                    u.times_executed,
                    fmt_ts(&u.last_executed_at),
                    u.last_success_at.as_ref().map(fmt_ts),
                    u.last_failure_at.as_ref().map(fmt_ts),
                    u.paused as i32,
                    u.completed as i32,
                    id,
                ],
            )?;
            if count == 0 {
                return Err(StorageError::ActionNotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn append_messages(&self, thread_id: &str, messages: &[ThreadMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let thread_id = thread_id.to_string();
        let rows = messages
            .iter()
            .map(|m| Ok((m.id.clone(), m.role, serde_json::to_string(&m.content)?, m.created_at)))
            .collect::<Result<Vec<_>>>()?;
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let exists = tx
                .query_row("SELECT 1 FROM threads WHERE id = ?1", params![thread_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Err(StorageError::ThreadNotFound(thread_id));
            }
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO messages (id, thread_id, role, content, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (id, role, content, created_at) in &rows {
                    stmt.execute(params![id, thread_id, role.as_str(), content, fmt_ts(created_at)])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

/// Fixed-width RFC 3339 so lexical order matches chronological order.
fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => parse_ts(row, idx).map(Some),
        None => Ok(None),
    }
}

fn map_action(row: &Row<'_>) -> rusqlite::Result<Action> {
    Ok(Action {
        id: row.get(0)?,
        user_id: row.get(1)?,
        thread_id: row.get(2)?,
        description: row.get(3)?,
        frequency: row.get(4)?,
        start_time: parse_ts(row, 5)?,
        triggered: row.get::<_, i32>(6)? != 0,
        paused: row.get::<_, i32>(7)? != 0,
        completed: row.get::<_, i32>(8)? != 0,
        times_executed: row.get(9)?,
        max_executions: row.get(10)?,
        last_executed_at: parse_opt_ts(row, 11)?,
        last_success_at: parse_opt_ts(row, 12)?,
        last_failure_at: parse_opt_ts(row, 13)?,
        created_at: parse_ts(row, 14)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<ThreadMessage> {
    let role: String = row.get(2)?;
    let role = MessageRole::parse(&role).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, format!("unknown role {role}").into())
    })?;
    let content: String = row.get(3)?;
    let content = serde_json::from_str(&content)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(ThreadMessage {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        role,
        content,
        created_at: parse_ts(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    async fn store_with_thread() -> (SqliteActionStore, Thread) {
        let store = SqliteActionStore::open_in_memory().unwrap();
        let thread = store.create_thread("user-1", "Daily SOL check").await.unwrap();
        (store, thread)
    }

    fn new_action(thread: &Thread) -> NewAction {
        NewAction {
            user_id: thread.user_id.clone(),
            thread_id: thread.id.clone(),
            description: "Tell me the SOL price".into(),
            frequency: Some(3600),
            start_time: None,
            max_executions: Some(10),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_action() {
        let (store, thread) = store_with_thread().await;
        let created = store.create_action(new_action(&thread)).await.unwrap();

        let loaded = store.get_action(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded.description, "Tell me the SOL price");
        assert!(loaded.triggered);
        assert!(!loaded.paused);
        assert!(!loaded.completed);
        assert_eq!(loaded.times_executed, 0);
        assert!(loaded.last_executed_at.is_none());
        assert_eq!(loaded.max_executions, Some(10));
    }

    #[tokio::test]
    async fn test_get_action_not_found() {
        let store = SqliteActionStore::open_in_memory().unwrap();
        assert!(store.get_action("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_actions_filters_flags() {
        let (store, thread) = store_with_thread().await;
        let active = store.create_action(new_action(&thread)).await.unwrap();
        let paused = store.create_action(new_action(&thread)).await.unwrap();
        store.set_paused(&paused.id, true).await.unwrap();

        let mut completed = active.clone();
        completed.id = "done".into();
        completed.completed = true;
        store.insert_action(&completed).await.unwrap();

        let mut untriggered = active.clone();
        untriggered.id = "untriggered".into();
        untriggered.triggered = false;
        store.insert_action(&untriggered).await.unwrap();

        let listed = store.list_active_actions().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec![active.id.as_str()]);
        assert!(!ids.contains(&paused.id.as_str()));
        assert!(!ids.contains(&"done"));
        assert!(!ids.contains(&"untriggered"));
    }

    #[tokio::test]
    async fn test_update_action_bookkeeping() {
        let (store, thread) = store_with_thread().await;
        let action = store.create_action(new_action(&thread)).await.unwrap();
        let t1 = DateTime::from_timestamp(1_700_000_100 - 1_700_000_100 % 900, 0).unwrap();

        store
            .update_action(
                &action.id,
                &ActionUpdate {
                    times_executed: 1,
                    last_executed_at: t1,
                    last_success_at: Some(t1),
                    last_failure_at: None,
                    paused: false,
                    completed: false,
                },
            )
            .await
            .unwrap();

        let t2 = t1 + Duration::minutes(15);
        store
            .update_action(
                &action.id,
                &ActionUpdate {
                    times_executed: 2,
                    last_executed_at: t2,
                    last_success_at: None,
                    last_failure_at: Some(t2),
                    paused: true,
                    completed: false,
                },
            )
            .await
            .unwrap();

        let loaded = store.get_action(&action.id).await.unwrap().unwrap();
        assert_eq!(loaded.times_executed, 2);
        assert_eq!(loaded.last_executed_at, Some(t2));
        // success stamp from the first run is preserved
        assert_eq!(loaded.last_success_at, Some(t1));
        assert_eq!(loaded.last_failure_at, Some(t2));
        assert!(loaded.paused);
        assert!(store.list_active_actions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_action_errors() {
        let store = SqliteActionStore::open_in_memory().unwrap();
        let err = store
            .update_action(
                "ghost",
                &ActionUpdate {
                    times_executed: 1,
                    last_executed_at: Utc::now(),
                    last_success_at: None,
                    last_failure_at: None,
                    paused: false,
                    completed: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ActionNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_append_and_list_messages_in_order() {
        let (store, thread) = store_with_thread().await;
        let base = Utc::now();
        let messages: Vec<ThreadMessage> = (0..3)
            .map(|i| ThreadMessage {
                id: format!("m{i}"),
                thread_id: thread.id.clone(),
                role: if i % 2 == 0 { MessageRole::Assistant } else { MessageRole::Tool },
                content: json!({ "text": format!("part {i}") }),
                created_at: base + Duration::milliseconds(i),
            })
            .collect();
        store.append_messages(&thread.id, &messages).await.unwrap();

        let loaded = store.list_messages(&thread.id).await.unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].id, "m0");
        assert_eq!(loaded[1].role, MessageRole::Tool);
        assert_eq!(loaded[2].content["text"], "part 2");
    }

    #[tokio::test]
    async fn test_append_to_missing_thread_errors() {
        let store = SqliteActionStore::open_in_memory().unwrap();
        let msg = ThreadMessage {
            id: "m1".into(),
            thread_id: "ghost".into(),
            role: MessageRole::Assistant,
            content: json!("hi"),
            created_at: Utc::now(),
        };
        let err = store.append_messages("ghost", &[msg]).await.unwrap_err();
        assert!(matches!(err, StorageError::ThreadNotFound(_)));
    }

    #[tokio::test]
    async fn test_primary_wallet_switch() {
        let store = SqliteActionStore::open_in_memory().unwrap();
        let first = Wallet {
            id: "w1".into(),
            user_id: "user-1".into(),
            public_key: "KEY1".into(),
            chain: "solana".into(),
            is_primary: true,
        };
        store.upsert_wallet(&first).await.unwrap();
        assert_eq!(
            store.get_primary_wallet("user-1").await.unwrap().unwrap().public_key,
            "KEY1"
        );

        let second = Wallet {
            id: "w2".into(),
            public_key: "KEY2".into(),
            ..first.clone()
        };
        store.upsert_wallet(&second).await.unwrap();
        assert_eq!(
            store.get_primary_wallet("user-1").await.unwrap().unwrap().public_key,
            "KEY2"
        );
        assert!(store.get_primary_wallet("user-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actionbot.db");
        {
            let store = SqliteActionStore::open(&path).unwrap();
            store.create_thread("user-1", "persisted").await.unwrap();
        }
        let store = SqliteActionStore::open(&path).unwrap();
        let threads: i64 = store
            .blocking(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM threads", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(threads, 1);
    }
}
