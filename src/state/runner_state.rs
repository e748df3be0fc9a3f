//! Runner state machine
//!
//! CREATED → STAGED → TRANSFERRED → SUBMITTED → RUNNING → COMPLETED, with
//! FAILED as a terminal flag that shares COMPLETED's rank.

use chrono::{DateTime, Utc};
use remora_manifest::StateTag;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::TerminalState;

/// Runner lifecycle state.
///
/// Deliberately not `PartialOrd`: use [`RunnerState::rank`] and the explicit
/// comparison helpers, which treat FAILED as ranking with COMPLETED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerState {
    /// Prepared, nothing generated yet
    Created,
    /// Jobscript generated locally
    Staged,
    /// Jobscript pushed to the remote host
    Transferred,
    /// Included in an issued master script
    Submitted,
    /// Observed (or assumed) executing remotely
    Running,
    /// Result recorded remotely
    Completed,
    /// Failure recorded remotely
    Failed,
}

const RANKS: [(RunnerState, u8); 7] = [
    (RunnerState::Created, 0),
    (RunnerState::Staged, 1),
    (RunnerState::Transferred, 2),
    (RunnerState::Submitted, 3),
    (RunnerState::Running, 4),
    (RunnerState::Completed, 5),
    (RunnerState::Failed, 5),
];

impl TerminalState for RunnerState {
    fn is_terminal(&self) -> bool {
        matches!(self, RunnerState::Completed | RunnerState::Failed)
    }
}

impl RunnerState {
    /// Position in the lifecycle order
    pub fn rank(&self) -> u8 {
        RANKS
            .iter()
            .find(|(state, _)| state == self)
            .map(|(_, rank)| *rank)
            .unwrap_or(0)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunnerState::Failed)
    }

    /// Compare by rank only
    pub fn cmp_rank(&self, other: RunnerState) -> Ordering {
        self.rank().cmp(&other.rank())
    }

    /// `self` ranks strictly before `other`
    pub fn is_before(&self, other: RunnerState) -> bool {
        self.cmp_rank(other) == Ordering::Less
    }

    /// `self` ranks at or after `other`
    pub fn at_least(&self, other: RunnerState) -> bool {
        self.cmp_rank(other) != Ordering::Less
    }

    /// Whether manifest reconciliation may move a Runner from `self` to `target`.
    ///
    /// Forward-only by rank. FAILED is reachable from any non-terminal state;
    /// nothing leaves a terminal state.
    pub fn can_advance_to(&self, target: RunnerState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match target {
            RunnerState::Failed => true,
            _ => self.is_before(target),
        }
    }

    /// State a manifest tag maps to. `started` and `running` both mean RUNNING.
    pub fn from_tag(tag: StateTag) -> RunnerState {
        match tag {
            StateTag::Submitted => RunnerState::Submitted,
            StateTag::Started | StateTag::Running => RunnerState::Running,
            StateTag::Completed => RunnerState::Completed,
            StateTag::Failed => RunnerState::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerState::Created => "CREATED",
            RunnerState::Staged => "STAGED",
            RunnerState::Transferred => "TRANSFERRED",
            RunnerState::Submitted => "SUBMITTED",
            RunnerState::Running => "RUNNING",
            RunnerState::Completed => "COMPLETED",
            RunnerState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a state change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    /// A local pipeline step (stage, transfer, run)
    Local,
    /// Manifest reconciliation
    Manifest,
}

/// One observed state change of a Runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub state: RunnerState,
    pub source: ChangeSource,
    pub at: DateTime<Utc>,
}
