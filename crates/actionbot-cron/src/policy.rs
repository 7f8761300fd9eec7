//! Run bookkeeping and the pause/failure policy.
//!
//! Every processed run is reduced to one [`Transition`]. [`FailurePolicy::settle`]
//! computes it together with the [`ActionUpdate`] to persist and, when the
//! action gets paused, the notice to append to its thread.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use actionbot_config::SchedulerConfig;
use actionbot_types::{Action, ActionUpdate};

/// Bookkeeping timestamps are aligned to this grid.
pub const GRID_SECS: i64 = 900;

/// Round `ts` down to the previous 15-minute boundary.
pub fn floor_to_grid(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    let floored = secs - secs.rem_euclid(GRID_SECS);
    DateTime::from_timestamp(floored, 0).unwrap_or(ts)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingThread,
    MissingWallet,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingThread => f.write_str("missing_thread"),
            SkipReason::MissingWallet => f.write_str("missing_wallet"),
        }
    }
}

/// Why a run did not count as a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The orchestrator asked for tools that do not exist.
    UnknownTools(Vec<String>),
    /// The model answered without running any tool.
    NoToolExecuted,
    /// Classification, the model loop or persistence failed.
    Error(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::UnknownTools(names) => write!(f, "unknown tools: {}", names.join(", ")),
            FailureCause::NoToolExecuted => f.write_str("no tool executed"),
            FailureCause::Error(e) => write!(f, "error: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed(FailureCause),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Used to work, but has not succeeded within the grace window.
    SustainedFailure,
    /// Never succeeded within the allowed number of runs.
    NeverSucceeded,
}

/// Final state of one processed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// A prerequisite was missing; only the execution clock moved.
    Skipped(SkipReason),
    /// The run was counted; the action stays active unless its cap was hit.
    Completed(RunOutcome),
    /// The run failed and the action is now paused.
    Paused(PauseReason),
}

impl Transition {
    pub fn label(&self) -> &'static str {
        match self {
            Transition::Skipped(_) => "skipped",
            Transition::Completed(RunOutcome::Succeeded) => "succeeded",
            Transition::Completed(RunOutcome::Failed(_)) => "failed",
            Transition::Paused(_) => "paused",
        }
    }
}

/// Everything to apply for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub transition: Transition,
    pub update: ActionUpdate,
    /// Assistant message announcing a pause.
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct FailurePolicy {
    /// How long a previously healthy action may keep failing.
    pub grace: Duration,
    /// Runs a never-successful action gets before it is paused.
    pub never_succeeded_threshold: i64,
}

const DEFAULT_GRACE_HOURS: i64 = 24;

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            grace: Duration::hours(DEFAULT_GRACE_HOURS),
            never_succeeded_threshold: 3,
        }
    }
}

impl From<&SchedulerConfig> for FailurePolicy {
    fn from(config: &SchedulerConfig) -> Self {
        let grace = Duration::try_hours(config.failure_grace_hours)
            .filter(|grace| *grace >= Duration::zero())
            .unwrap_or_else(|| {
                tracing::warn!(
                    failure_grace_hours = config.failure_grace_hours,
                    "Invalid failure grace window, using {DEFAULT_GRACE_HOURS}h"
                );
                Duration::hours(DEFAULT_GRACE_HOURS)
            });
        Self {
            grace,
            never_succeeded_threshold: config.never_succeeded_threshold,
        }
    }
}

impl FailurePolicy {
    /// Bookkeeping for a processed run finishing at `now`.
    pub fn settle(&self, action: &Action, outcome: RunOutcome, now: DateTime<Utc>) -> Settlement {
        let complete_time = floor_to_grid(now);
        let times_executed = action.times_executed + 1;
        let completed = action
            .execution_cap()
            .is_some_and(|cap| times_executed >= cap);

        let mut update = ActionUpdate {
            times_executed,
            last_executed_at: complete_time,
            last_success_at: None,
            last_failure_at: None,
            paused: action.paused,
            completed,
        };

        if outcome.is_success() {
            update.last_success_at = Some(complete_time);
            return Settlement {
                transition: Transition::Completed(outcome),
                update,
                notice: None,
            };
        }

        update.last_failure_at = Some(complete_time);

        let pause = match action.last_success_at {
            Some(last) if now - last > self.grace => Some(PauseReason::SustainedFailure),
            Some(_) => None,
            None if action.times_executed >= self.never_succeeded_threshold => {
                Some(PauseReason::NeverSucceeded)
            }
            None => None,
        };

        match pause {
            Some(reason) => {
                update.paused = true;
                Settlement {
                    transition: Transition::Paused(reason),
                    update,
                    notice: Some(self.notice(reason, action)),
                }
            }
            None => Settlement {
                transition: Transition::Completed(outcome),
                update,
                notice: None,
            },
        }
    }

    /// Bookkeeping for a run that could not start.
    ///
    /// Advances the execution clock so the action waits a full frequency
    /// before the next attempt; counters, stamps and flags stay as they are.
    pub fn settle_skipped(&self, action: &Action, reason: SkipReason, now: DateTime<Utc>) -> Settlement {
        Settlement {
            transition: Transition::Skipped(reason),
            update: ActionUpdate {
                times_executed: action.times_executed,
                last_executed_at: floor_to_grid(now),
                last_success_at: None,
                last_failure_at: None,
                paused: action.paused,
                completed: action.completed,
            },
            notice: None,
        }
    }

    fn notice(&self, reason: PauseReason, action: &Action) -> String {
        match reason {
            PauseReason::SustainedFailure => format!(
                "I've paused the scheduled action \"{}\" because it has kept failing for more than {} hours. \
                 Unpause it once the problem is fixed.",
                action.description,
                self.grace.num_hours()
            ),
            PauseReason::NeverSucceeded => format!(
                "I've paused the scheduled action \"{}\" because it failed on each of its first {} runs. \
                 Check the instructions and unpause it to try again.",
                action.description,
                action.times_executed + 1
            ),
        }
    }
}
