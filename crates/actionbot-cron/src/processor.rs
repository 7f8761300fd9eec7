//! One action, one tick.
//!
//! The processor resolves the run's prerequisites, lets the orchestrator pick
//! the tools, runs the tool loop, stores the produced messages and finally
//! applies the settled bookkeeping. Everything between prerequisite lookup
//! and bookkeeping is folded into the run outcome, panics included; only
//! store failures while resolving or applying escape to the caller.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use tracing::{error, info, warn};

use actionbot_config::SchedulerConfig;
use actionbot_llm::{ChatMessage, ChatModel, LoopRequest, Orchestrator, ToolLoop};
use actionbot_storage::ActionStore;
use actionbot_tools::{ToolContext, ToolRegistry, ToolSelection};
use actionbot_types::{Action, ThreadMessage, Wallet};

use crate::policy::{FailureCause, FailurePolicy, RunOutcome, Settlement, SkipReason, Transition};

const SYSTEM_PROMPT: &str = "You are a DeFi assistant executing a task the user scheduled earlier. \
The user is not present, so never ask for confirmation or clarification. \
Use the available tools to carry out the task, then reply with a short summary of what was done.";

fn system_prompt(wallet: &Wallet) -> String {
    format!(
        "{SYSTEM_PROMPT}\n\nThe user's primary wallet ({}) public key is {}.",
        wallet.chain, wallet.public_key
    )
}

pub struct ActionProcessor {
    store: Arc<dyn ActionStore>,
    registry: Arc<ToolRegistry>,
    orchestrator: Arc<dyn Orchestrator>,
    tool_loop: ToolLoop,
    policy: FailurePolicy,
}

impl ActionProcessor {
    pub fn new(
        store: Arc<dyn ActionStore>,
        registry: Arc<ToolRegistry>,
        orchestrator: Arc<dyn Orchestrator>,
        model: Arc<dyn ChatModel>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            orchestrator,
            tool_loop: ToolLoop::new(model, config.max_steps),
            policy: FailurePolicy::from(config),
        }
    }

    /// Process `action` and persist the resulting bookkeeping.
    ///
    /// Fails only if a store lookup or the final bookkeeping write fails.
    pub async fn process(&self, action: &Action) -> anyhow::Result<Transition> {
        info!(action_id = %action.id, times_executed = action.times_executed, "Processing action");

        let settlement = match self.prerequisites(action).await? {
            Err(reason) => {
                warn!(action_id = %action.id, %reason, "Skipping action run");
                self.policy.settle_skipped(action, reason, Utc::now())
            }
            Ok(wallet) => {
                let run = AssertUnwindSafe(self.execute(action, &wallet)).catch_unwind();
                let outcome = match run.await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        let message = format!("{e:#}");
                        error!(action_id = %action.id, error = %message, "Action run failed");
                        RunOutcome::Failed(FailureCause::Error(message))
                    }
                    Err(payload) => {
                        let message = format!("Action run panicked: {}", panic_message(&*payload));
                        error!(action_id = %action.id, error = %message, "Action run failed");
                        RunOutcome::Failed(FailureCause::Error(message))
                    }
                };
                if let RunOutcome::Failed(cause) = &outcome {
                    info!(action_id = %action.id, %cause, "Action run unsuccessful");
                }
                self.policy.settle(action, outcome, Utc::now())
            }
        };

        self.apply(action, &settlement).await?;
        info!(
            action_id = %action.id,
            transition = settlement.transition.label(),
            times_executed = settlement.update.times_executed,
            completed = settlement.update.completed,
            "Action settled"
        );
        Ok(settlement.transition)
    }

    /// The thread must exist and the user must have a primary wallet.
    async fn prerequisites(&self, action: &Action) -> anyhow::Result<Result<Wallet, SkipReason>> {
        let thread = self
            .store
            .get_thread(&action.thread_id)
            .await
            .with_context(|| format!("Failed to load thread {}", action.thread_id))?;
        if thread.is_none() {
            return Ok(Err(SkipReason::MissingThread));
        }

        let wallet = self
            .store
            .get_primary_wallet(&action.user_id)
            .await
            .with_context(|| format!("Failed to load wallet of user {}", action.user_id))?;
        Ok(wallet.ok_or(SkipReason::MissingWallet))
    }

    async fn execute(&self, action: &Action, wallet: &Wallet) -> anyhow::Result<RunOutcome> {
        let names = self
            .orchestrator
            .required_tools(&[ChatMessage::user(action.description.clone())], true)
            .await
            .context("Tool classification failed")?;

        let selection = ToolSelection::from_orchestrator(names);
        if let ToolSelection::Unresolvable(unknown) = selection {
            return Ok(RunOutcome::Failed(FailureCause::UnknownTools(unknown)));
        }
        let tools = selection.assemble(&self.registry).unwrap_or_default();

        let ctx = ToolContext::for_action(
            action.id.clone(),
            action.user_id.clone(),
            action.thread_id.clone(),
            wallet.public_key.clone(),
        );
        let outcome = self
            .tool_loop
            .run(LoopRequest {
                system: system_prompt(wallet),
                instruction: action.description.clone(),
                tools: &tools,
                ctx: &ctx,
            })
            .await
            .context("Tool loop failed")?;

        self.persist(action, &outcome.messages, Utc::now())
            .await
            .context("Failed to store run messages")?;

        if outcome.executed_any_tool() {
            Ok(RunOutcome::Succeeded)
        } else {
            Ok(RunOutcome::Failed(FailureCause::NoToolExecuted))
        }
    }

    async fn persist(
        &self,
        action: &Action,
        messages: &[ChatMessage],
        base: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let rows = messages
            .iter()
            .enumerate()
            .map(|(i, message)| {
                thread_message(
                    &action.thread_id,
                    message,
                    base + Duration::milliseconds(i as i64),
                )
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        self.store.append_messages(&action.thread_id, &rows).await?;
        Ok(())
    }

    async fn apply(&self, action: &Action, settlement: &Settlement) -> anyhow::Result<()> {
        self.store
            .update_action(&action.id, &settlement.update)
            .await
            .with_context(|| format!("Failed to update action {}", action.id))?;

        if let Some(notice) = &settlement.notice {
            let message = thread_message(
                &action.thread_id,
                &ChatMessage::assistant(notice.clone()),
                Utc::now(),
            )?;
            self.store
                .append_messages(&action.thread_id, &[message])
                .await
                .with_context(|| format!("Failed to post pause notice for action {}", action.id))?;
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn thread_message(
    thread_id: &str,
    message: &ChatMessage,
    created_at: DateTime<Utc>,
) -> anyhow::Result<ThreadMessage> {
    Ok(ThreadMessage {
        id: uuid::Uuid::new_v4().to_string(),
        thread_id: thread_id.to_string(),
        role: message.role(),
        content: serde_json::to_value(message)?,
        created_at,
    })
}
