//! Which active actions are due on this tick.
//!
//! Pure functions of the action and a supplied `now`; the caller owns the clock.

use chrono::{DateTime, Duration, Utc};

use actionbot_types::Action;

/// Whether `action` should run at `now`.
///
/// Non-recurring actions and actions whose start time lies in the future are
/// never due. An action that has never run is due once its start time is
/// reached; otherwise it is due one frequency after its last execution.
pub fn is_due(action: &Action, now: DateTime<Utc>) -> bool {
    let Some(frequency) = action.recurrence_secs() else {
        return false;
    };
    if action.start_time > now {
        return false;
    }
    match action.last_executed_at {
        None => true,
        Some(last) => now >= last + Duration::seconds(frequency),
    }
}

/// The subset of `actions` due at `now`, in input order.
pub fn due_actions(actions: &[Action], now: DateTime<Utc>) -> Vec<Action> {
    actions.iter().filter(|a| is_due(a, now)).cloned().collect()
}
