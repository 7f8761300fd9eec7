mod actions;
mod app;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use actionbot_config::ActionBotConfig;
use app::App;

#[derive(Parser)]
#[command(name = "actionbot", about = "Scheduled action runner")]
struct Cli {
    /// Config file (defaults to ~/.actionbot/config.json5)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP cron trigger
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Also run the in-process scheduler loop
        #[arg(long)]
        with_scheduler: bool,
    },
    /// Run the in-process scheduler loop until interrupted
    RunScheduler {
        /// Seconds between ticks (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Run a single tick and print its report
    Tick,
    /// Manage scheduled actions
    Actions {
        #[command(subcommand)]
        command: ActionsCommand,
    },
    /// Manage wallets
    Wallet {
        #[command(subcommand)]
        command: WalletCommand,
    },
    /// Check system health
    Health,
}

#[derive(Subcommand)]
enum ActionsCommand {
    /// List all actions
    List,
    /// Schedule a new action
    Create {
        /// Owning user
        #[arg(short, long)]
        user: String,

        /// Existing thread to post into (a new one is created otherwise)
        #[arg(short, long)]
        thread: Option<String>,

        /// Seconds between runs
        #[arg(short, long)]
        frequency: i64,

        /// Stop after this many runs
        #[arg(short, long)]
        max_executions: Option<i64>,

        /// RFC 3339 start time (defaults to now)
        #[arg(long)]
        start_time: Option<DateTime<Utc>>,

        /// Instruction to run on every execution
        description: String,
    },
    /// Clear the paused flag of an action
    Unpause { id: String },
}

#[derive(Subcommand)]
enum WalletCommand {
    /// Register the user's primary wallet
    Set {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        public_key: String,

        #[arg(long, default_value = "solana")]
        chain: String,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ActionBotConfig> {
    match path {
        Some(path) => {
            let _ = dotenvy::dotenv();
            let mut config = actionbot_config::load_config_from(path)?;
            config.apply_env_overrides();
            Ok(config)
        }
        None => Ok(actionbot_config::load_config()?),
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            token.cancel();
        }
    });
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let json = cli.json;
    init_tracing(json);

    let config = load_config(cli.config.as_ref())?;
    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Serve {
            port,
            with_scheduler,
        } => rt.block_on(async {
            let app = App::build(config)?;
            let shutdown = CancellationToken::new();
            cancel_on_ctrl_c(shutdown.clone());

            let loop_handle = with_scheduler.then(|| {
                let interval = Duration::from_secs(app.config.scheduler.tick_interval_secs);
                tokio::spawn(app.scheduler.clone().run(interval, shutdown.clone()))
            });

            actionbot_gateway::start_server(
                &app.config.server,
                app.scheduler.clone(),
                port,
                shutdown.clone(),
            )
            .await?;

            shutdown.cancel();
            if let Some(handle) = loop_handle {
                handle.await?;
            }
            anyhow::Ok(())
        })?,
        Commands::RunScheduler { interval } => rt.block_on(async {
            let app = App::build(config)?;
            let shutdown = CancellationToken::new();
            cancel_on_ctrl_c(shutdown.clone());

            let secs = interval.unwrap_or(app.config.scheduler.tick_interval_secs);
            app.scheduler
                .clone()
                .run(Duration::from_secs(secs.max(1)), shutdown)
                .await;
            anyhow::Ok(())
        })?,
        Commands::Tick => rt.block_on(async {
            let app = App::build(config)?;
            let report = app.scheduler.run_tick().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            anyhow::Ok(())
        })?,
        Commands::Actions { command } => rt.block_on(async {
            let store = app::open_store(&config)?;
            match command {
                ActionsCommand::List => actions::list(&store, json).await,
                ActionsCommand::Create {
                    user,
                    thread,
                    frequency,
                    max_executions,
                    start_time,
                    description,
                } => {
                    actions::create(
                        &store,
                        actions::CreateArgs {
                            user,
                            thread,
                            description,
                            frequency,
                            max_executions,
                            start_time,
                        },
                    )
                    .await
                }
                ActionsCommand::Unpause { id } => actions::unpause(&store, &id).await,
            }
        })?,
        Commands::Wallet { command } => rt.block_on(async {
            let store = app::open_store(&config)?;
            match command {
                WalletCommand::Set {
                    user,
                    public_key,
                    chain,
                } => actions::set_wallet(&store, user, public_key, chain).await,
            }
        })?,
        Commands::Health => {
            println!("actionbot is healthy");
            println!("  database: {}", config.database_path()?.display());
            println!("  model: {}", config.llm.model);
            println!("  orchestrator model: {}", config.llm.orchestrator_model());
            println!("  api key configured: {}", config.llm.api_key.is_some());
            println!("  cron secret configured: {}", config.server.cron_secret.is_some());
            println!("  server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
