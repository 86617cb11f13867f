//! Catalog record types
//!
//! Field names match the persisted JSON layout of the `sorries` collection.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The crawled commit an obligation was found in. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitRef {
    pub remote: String,
    pub branch: String,
    pub commit: String,
    /// Toolchain release the commit was built with, e.g. `v4.17.0`
    pub lean_version: String,
}

/// Source span of a placeholder. Lines and columns are 1-based, end exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Location {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    /// Path relative to the repository root
    pub file: String,
}

impl Location {
    /// Ordering key: start position, then end position.
    pub fn span_key(&self) -> (u32, u32, u32, u32) {
        (self.start_line, self.start_column, self.end_line, self.end_column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebugInfo {
    /// Pretty-printed goal, for humans only
    pub goal: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    pub blame_commit: String,
    pub blame_email_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub blame_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub inclusion_date: OffsetDateTime,
}

/// Attribution for the line holding an obligation.
///
/// `commit_sha` is the last commit touching the line, which may predate
/// the crawled commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameInfo {
    pub commit_sha: String,
    pub author_email_hash: String,
    pub date: OffsetDateTime,
}

/// One catalog entry. Append-only: never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SorryRecord {
    pub repo: CommitRef,
    pub location: Location,
    pub debug_info: DebugInfo,
    pub metadata: Metadata,
    pub id: String,
}

impl SorryRecord {
    pub fn goal(&self) -> &str {
        &self.debug_info.goal
    }

    pub fn remote(&self) -> &str {
        &self.repo.remote
    }
}
