//! Tick fan-out and the in-process scheduler loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use actionbot_storage::ActionStore;

use crate::eligibility::due_actions;
use crate::policy::{RunOutcome, Transition};
use crate::processor::ActionProcessor;

/// Counts for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub eligible: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub paused: usize,
    pub skipped: usize,
    /// Runs whose bookkeeping could not be written, or that panicked.
    pub errored: usize,
}

impl TickReport {
    fn record(&mut self, transition: &Transition) {
        match transition {
            Transition::Skipped(_) => self.skipped += 1,
            Transition::Completed(RunOutcome::Succeeded) => self.succeeded += 1,
            Transition::Completed(RunOutcome::Failed(_)) => self.failed += 1,
            Transition::Paused(_) => self.paused += 1,
        }
    }
}

pub struct ActionScheduler {
    store: Arc<dyn ActionStore>,
    processor: Arc<ActionProcessor>,
}

impl ActionScheduler {
    pub fn new(store: Arc<dyn ActionStore>, processor: Arc<ActionProcessor>) -> Self {
        Self { store, processor }
    }

    /// Run every due action once, concurrently.
    ///
    /// Only listing the candidates can fail; per-action errors and panics are
    /// counted in the report and never affect sibling runs.
    pub async fn run_tick(&self) -> anyhow::Result<TickReport> {
        let active = self
            .store
            .list_active_actions()
            .await
            .context("Failed to list active actions")?;
        let due = due_actions(&active, Utc::now());

        let mut report = TickReport {
            eligible: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            info!(active = active.len(), "No actions due");
            return Ok(report);
        }

        let handles: Vec<_> = due
            .into_iter()
            .map(|action| {
                let processor = self.processor.clone();
                let id = action.id.clone();
                let handle = tokio::spawn(async move { processor.process(&action).await });
                (id, handle)
            })
            .collect();

        let ids: Vec<String> = handles.iter().map(|(id, _)| id.clone()).collect();
        let results = futures::future::join_all(handles.into_iter().map(|(_, h)| h)).await;

        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(Ok(transition)) => report.record(&transition),
                Ok(Err(e)) => {
                    let message = format!("{e:#}");
                    error!(action_id = %id, error = %message, "Action bookkeeping failed");
                    report.errored += 1;
                }
                Err(e) => {
                    error!(action_id = %id, error = %e, "Action task aborted");
                    report.errored += 1;
                }
            }
        }

        info!(
            eligible = report.eligible,
            succeeded = report.succeeded,
            failed = report.failed,
            paused = report.paused,
            skipped = report.skipped,
            errored = report.errored,
            "Tick finished"
        );
        Ok(report)
    }

    /// Run ticks every `interval` until `cancel` fires.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "Action scheduler started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.run_tick().await {
                warn!("Scheduler tick failed: {e:#}");
            }
        }
        info!("Action scheduler stopped");
    }
}
