//! Per-run statistics

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::crawler::RepoState;
use crate::error::StoreResult;
use crate::store::write_json_atomic;
use crate::util::format_span;

/// Counts for one crawled leaf commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    /// Records produced from this commit
    pub count: usize,
    /// Of those, goals whose signature was not in the catalog before the run
    pub count_new_proof: usize,
    /// Files whose extraction failed
    pub extraction_failures: usize,
    /// The checkout of this commit could not be cloned
    #[serde(default)]
    pub clone_failed: bool,
    /// Building this commit failed, or no extractor could be started for it
    #[serde(default)]
    pub build_failed: bool,
    /// Building this commit ran out of time
    #[serde(default)]
    pub build_timeout: bool,
}

impl CommitStats {
    /// Flag the failure that stopped this commit
    pub fn mark_failed(&mut self, state: RepoState) {
        match state {
            RepoState::Unreachable => self.clone_failed = true,
            RepoState::BuildTimedOut => self.build_timeout = true,
            _ => self.build_failed = true,
        }
    }
}

/// Statistics for one repository in one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoStats {
    pub state: Option<RepoState>,
    pub counts: BTreeMap<String, CommitStats>,
    pub new_leaf_commit: Option<bool>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub start_processing_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub end_processing_time: Option<OffsetDateTime>,
    pub total_processing_time: Option<String>,
    /// `None` when no build was attempted, `Some(true)` once any build timed out
    pub build_timeout: Option<bool>,
}

impl RepoStats {
    pub fn started(at: OffsetDateTime) -> Self {
        Self {
            start_processing_time: Some(at),
            ..Self::default()
        }
    }

    /// Close the entry with its terminal state
    pub fn finish(&mut self, state: RepoState, at: OffsetDateTime) {
        self.state = Some(state);
        self.end_processing_time = Some(at);
        if let Some(start) = self.start_processing_time {
            self.total_processing_time = Some(format_span(start, at));
        }
        if state == RepoState::BuildTimedOut {
            self.build_timeout = Some(true);
        }
    }
}

/// Statistics for a whole run, keyed by remote URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsCollector {
    repos: BTreeMap<String, RepoStats>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, remote_url: &str, stats: RepoStats) {
        self.repos.insert(remote_url.to_string(), stats);
    }

    pub fn get(&self, remote_url: &str) -> Option<&RepoStats> {
        self.repos.get(remote_url)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RepoStats)> {
        self.repos.iter()
    }

    pub fn write(&self, path: &Path) -> StoreResult<()> {
        write_json_atomic(path, self)
    }

    pub fn summary(&self, new_records: usize) -> RunSummary {
        let mut summary = RunSummary {
            new_records,
            ..RunSummary::default()
        };
        for stats in self.repos.values() {
            match stats.state {
                Some(RepoState::Skipped) => summary.skipped += 1,
                Some(RepoState::Recorded) => summary.updated += 1,
                _ => summary.failed += 1,
            }
        }
        summary
    }
}

/// What `update` prints when it is done
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub skipped: usize,
    pub updated: usize,
    pub failed: usize,
    pub new_records: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} repositories updated, {} unchanged, {} failed; {} new sorries",
            self.updated, self.skipped, self.failed, self.new_records
        )
    }
}
