//! Runner lifecycle state

mod runner_state;

pub use runner_state::{ChangeSource, RunnerState, StateChange};

/// Check if a state is terminal (no further transitions possible)
pub trait TerminalState {
    fn is_terminal(&self) -> bool;
}
