//! `actions` and `wallet` subcommands.

use anyhow::Context;
use chrono::{DateTime, Utc};

use actionbot_storage::{ActionStore, SqliteActionStore};
use actionbot_tools::tools::create_action::MIN_FREQUENCY_SECS;
use actionbot_types::{Action, NewAction, Wallet};

fn status(action: &Action) -> &'static str {
    if action.completed {
        "completed"
    } else if action.paused {
        "paused"
    } else if !action.triggered {
        "inactive"
    } else {
        "active"
    }
}

fn fmt_opt(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub async fn list(store: &SqliteActionStore, json: bool) -> anyhow::Result<()> {
    let actions = store.list_actions().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&actions)?);
        return Ok(());
    }
    if actions.is_empty() {
        println!("No actions scheduled.");
        return Ok(());
    }
    for a in &actions {
        let runs = match a.execution_cap() {
            Some(cap) => format!("{}/{cap}", a.times_executed),
            None => a.times_executed.to_string(),
        };
        println!(
            "{}  [{}]  every {}s  runs {}  last {}  ok {}  fail {}",
            a.id,
            status(a),
            a.frequency.unwrap_or(0),
            runs,
            fmt_opt(a.last_executed_at),
            fmt_opt(a.last_success_at),
            fmt_opt(a.last_failure_at),
        );
        println!("    {}", a.description);
    }
    Ok(())
}

pub struct CreateArgs {
    pub user: String,
    pub thread: Option<String>,
    pub description: String,
    pub frequency: i64,
    pub max_executions: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
}

pub async fn create(store: &SqliteActionStore, args: CreateArgs) -> anyhow::Result<()> {
    anyhow::ensure!(
        args.frequency >= MIN_FREQUENCY_SECS,
        "Frequency must be at least {MIN_FREQUENCY_SECS} seconds"
    );

    let thread_id = match args.thread {
        Some(id) => {
            store
                .get_thread(&id)
                .await?
                .with_context(|| format!("Thread {id} not found"))?;
            id
        }
        None => store.create_thread(&args.user, &args.description).await?.id,
    };

    let action = store
        .create_action(NewAction {
            user_id: args.user,
            thread_id,
            description: args.description,
            frequency: Some(args.frequency),
            start_time: args.start_time,
            max_executions: args.max_executions,
        })
        .await?;
    println!("Created action {} (thread {})", action.id, action.thread_id);
    Ok(())
}

pub async fn unpause(store: &SqliteActionStore, id: &str) -> anyhow::Result<()> {
    store
        .set_paused(id, false)
        .await
        .with_context(|| format!("Failed to unpause action {id}"))?;
    println!("Action {id} unpaused");
    Ok(())
}

pub async fn set_wallet(
    store: &SqliteActionStore,
    user: String,
    public_key: String,
    chain: String,
) -> anyhow::Result<()> {
    let wallet = Wallet {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user,
        public_key,
        chain,
        is_primary: true,
    };
    store.upsert_wallet(&wallet).await?;
    println!("Primary wallet for {} set to {}", wallet.user_id, wallet.public_key);
    Ok(())
}
