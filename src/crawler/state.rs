use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a repository is in the per-run lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoState {
    Pending,
    ProbingRemote,
    Skipped,
    Unreachable,
    Cloning,
    Building,
    BuildFailed,
    BuildTimedOut,
    Extracting,
    Recorded,
}

impl RepoState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RepoState::Skipped
                | RepoState::Unreachable
                | RepoState::BuildFailed
                | RepoState::BuildTimedOut
                | RepoState::Recorded
        )
    }

    /// Whether the stored visit (head digest and timestamp) advances on this outcome.
    ///
    /// `BuildTimedOut` and `Unreachable` leave both fields alone so the next run
    /// retries. The timestamp cannot move without the digest: a newer visit time
    /// with the old digest would hide the timed-out commits on the next run.
    pub fn advances_visit(self) -> bool {
        matches!(self, RepoState::Skipped | RepoState::BuildFailed | RepoState::Recorded)
    }

    fn can_move_to(self, next: RepoState) -> bool {
        use RepoState::*;
        matches!(
            (self, next),
            (Pending, ProbingRemote)
                | (ProbingRemote, Skipped | Unreachable | Cloning | Recorded)
                | (Cloning, Building)
                | (Building, Extracting)
                | (Extracting, Recorded | Cloning)
                | (Cloning | Building, Cloning)
                | (Cloning | Building | Extracting, Unreachable | BuildFailed | BuildTimedOut)
        )
    }
}

impl fmt::Display for RepoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepoState::Pending => "pending",
            RepoState::ProbingRemote => "probing_remote",
            RepoState::Skipped => "skipped",
            RepoState::Unreachable => "unreachable",
            RepoState::Cloning => "cloning",
            RepoState::Building => "building",
            RepoState::BuildFailed => "build_failed",
            RepoState::BuildTimedOut => "build_timed_out",
            RepoState::Extracting => "extracting",
            RepoState::Recorded => "recorded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: RepoState,
    pub to: RepoState,
}

/// Validated lifecycle of one repository.
///
/// `Cloning`, `Building` or `Extracting -> Cloning` moves on to the next leaf
/// commit of the same repository, after a success or a failed leaf.
#[derive(Debug, Clone)]
pub struct RepoStateMachine {
    state: RepoState,
}

impl Default for RepoStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RepoStateMachine {
    pub fn new() -> Self {
        Self {
            state: RepoState::Pending,
        }
    }

    pub fn state(&self) -> RepoState {
        self.state
    }

    pub fn advance(&mut self, next: RepoState) -> Result<RepoState, IllegalTransition> {
        if !self.state.can_move_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(from = %self.state, to = %next, "state");
        self.state = next;
        Ok(next)
    }
}
