//! Goal extraction
//!
//! The Lean toolchain is only reached through the REPL line protocol. The
//! crawler depends on the [`GoalExtractor`] capability so tests can swap in
//! a scripted fake.

mod installer;
mod protocol;
mod repl;

pub use installer::{REPL_REPO_URL, ReplInstaller};
pub use protocol::{FileRequest, Position, ReplResponse, ReplSorry};
pub use repl::ReplGoalExtractor;

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::error::ExtractionError;
use crate::model::Location;

/// Goals mentioning unassigned metavariables or universe levels are not
/// self-contained and cannot be attempted on their own.
static UNRESOLVED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\?(m|u)\.\d+|_uniq\.\d+").unwrap());

/// One placeholder with its goal, located in 1-based coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedGoal {
    pub location: Location,
    pub goal: String,
}

/// Produces the open goals of a single source file.
///
/// Calls on one extractor are sequential. Output is sorted by span.
#[async_trait]
pub trait GoalExtractor: Send {
    async fn extract(&mut self, file: &Path) -> Result<Vec<ExtractedGoal>, ExtractionError>;
}

/// How workspaces obtain a REPL
#[derive(Clone)]
pub struct ReplSettings {
    /// Prebuilt binary; skips installation when set
    pub repl_binary: Option<PathBuf>,
    pub installer: Arc<ReplInstaller>,
    /// Per-file request timeout
    pub timeout: Duration,
}

pub fn has_unresolved_metavariables(goal: &str) -> bool {
    UNRESOLVED.is_match(goal)
}

/// Convert raw REPL sorries into located goals: columns shift to 1-based,
/// unusable goals are dropped and the rest sorted by span (stable).
pub fn finalize_goals(file: &Path, sorries: Vec<ReplSorry>) -> Vec<ExtractedGoal> {
    let file = file.to_string_lossy().into_owned();
    let mut goals: Vec<ExtractedGoal> = sorries
        .into_iter()
        .filter(|s| !s.goal.trim().is_empty() && !has_unresolved_metavariables(&s.goal))
        .map(|s| ExtractedGoal {
            location: Location {
                start_line: s.pos.line,
                start_column: s.pos.column + 1,
                end_line: s.end_pos.line,
                end_column: s.end_pos.column + 1,
                file: file.clone(),
            },
            goal: s.goal,
        })
        .collect();
    goals.sort_by_key(|g| g.location.span_key());
    goals
}
