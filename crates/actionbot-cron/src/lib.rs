//! actionbot-cron: scheduled execution of stored actions.
//!
//! A tick lists the active actions, keeps the ones that are due, and runs
//! every due action through the [`ActionProcessor`] concurrently. Each run
//! ends in exactly one [`Transition`] that is written back in a single
//! store update.

pub mod eligibility;
pub mod policy;
pub mod processor;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use eligibility::{due_actions, is_due};
pub use policy::{
    FailureCause, FailurePolicy, PauseReason, RunOutcome, Settlement, SkipReason, Transition,
    floor_to_grid,
};
pub use processor::ActionProcessor;
pub use scheduler::{ActionScheduler, TickReport};
