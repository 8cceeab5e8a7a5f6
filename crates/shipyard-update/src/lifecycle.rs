//! Phase state machine.
//!
//! ```text
//!   Pending ──▶ Running ──▶ Completed ──┐
//!                 ▲  │                  │ (rollback)
//!        (resume) │  ▼                  ▼
//!                 └─ Failed ───────▶ RolledBack
//! ```
//!
//! `Completed` and `RolledBack` are terminal for a forward run and a rollback
//! pass respectively. `Failed` is not terminal: it is resumed or rolled back.

use crate::error::{Result, UpdateError};
use crate::types::PhaseState;

/// Validates a state transition and returns the target state if valid.
///
/// # Errors
///
/// Returns `UpdateError::InvalidTransition` if the transition is not allowed.
pub fn validate_transition(phase: &str, from: PhaseState, to: PhaseState) -> Result<PhaseState> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(UpdateError::InvalidTransition {
            phase: phase.to_string(),
            from,
            to,
        })
    }
}

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: PhaseState, to: PhaseState) -> bool {
    use PhaseState::{Completed, Failed, Pending, RolledBack, Running};

    matches!(
        (from, to),
        (Pending | Failed, Running) | (Running, Completed | Failed) | (Completed | Failed, RolledBack)
    )
}

/// Returns true if the phase may be (re-)executed.
#[must_use]
pub const fn can_execute(state: PhaseState) -> bool {
    matches!(state, PhaseState::Pending | PhaseState::Failed)
}

/// Returns true if the phase holds changes that a rollback would undo.
#[must_use]
pub const fn can_roll_back(state: PhaseState) -> bool {
    matches!(state, PhaseState::Completed | PhaseState::Failed)
}

/// Returns true if the phase holds no applied changes.
#[must_use]
pub const fn is_unapplied(state: PhaseState) -> bool {
    matches!(state, PhaseState::Pending | PhaseState::RolledBack)
}
