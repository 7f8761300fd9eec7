//! Wiring of store, tools, model and scheduler from configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use actionbot_config::ActionBotConfig;
use actionbot_cron::{ActionProcessor, ActionScheduler};
use actionbot_llm::{ChatModel, LlmOrchestrator, OpenAiClient};
use actionbot_storage::SqliteActionStore;
use actionbot_tools::ToolRegistry;
use actionbot_tools::tools::create_builtin_tools;

pub struct App {
    pub config: ActionBotConfig,
    pub store: Arc<SqliteActionStore>,
    pub scheduler: Arc<ActionScheduler>,
}

/// Open the configured database, creating parent directories as needed.
pub fn open_store(config: &ActionBotConfig) -> anyhow::Result<Arc<SqliteActionStore>> {
    let path = config.database_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = SqliteActionStore::open(&path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

impl App {
    pub fn build(config: ActionBotConfig) -> anyhow::Result<Self> {
        let store = open_store(&config)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let registry = Arc::new(ToolRegistry::new(create_builtin_tools(
            store.clone(),
            http,
            &config.tools,
        ))?);

        let client = OpenAiClient::new(&config.llm)?;
        let orchestrator = LlmOrchestrator::new(
            Arc::new(client.with_model(config.llm.orchestrator_model())),
            registry.specs(),
        );
        let model: Arc<dyn ChatModel> = Arc::new(client);

        let processor = ActionProcessor::new(
            store.clone(),
            registry.clone(),
            Arc::new(orchestrator),
            model,
            &config.scheduler,
        );
        let scheduler = Arc::new(ActionScheduler::new(store.clone(), Arc::new(processor)));

        info!(
            tools = registry.len(),
            model = %config.llm.model,
            orchestrator_model = %config.llm.orchestrator_model(),
            "Action pipeline ready"
        );

        Ok(Self {
            config,
            store,
            scheduler,
        })
    }
}
