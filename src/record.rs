//! Content-addressed catalog records

use std::collections::BTreeMap;

use serde_json::Value;
use time::OffsetDateTime;

use crate::model::{BlameInfo, CommitRef, DebugInfo, Location, Metadata, SorryRecord};
use crate::util::sha256_hex;

/// Stable id of a placeholder at a location in a crawled commit.
///
/// SHA-256 of the compact JSON object of the identifying fields with keys in
/// lexicographic order. The toolchain version is not part of the identity.
/// Changing the hashed fields changes every id in existing catalogs.
pub fn sorry_id(commit: &CommitRef, location: &Location) -> String {
    let mut key: BTreeMap<&str, Value> = BTreeMap::new();
    key.insert("remote", Value::from(commit.remote.as_str()));
    key.insert("branch", Value::from(commit.branch.as_str()));
    key.insert("commit", Value::from(commit.commit.as_str()));
    key.insert("file", Value::from(location.file.as_str()));
    key.insert("start_line", Value::from(location.start_line));
    key.insert("start_column", Value::from(location.start_column));
    key.insert("end_line", Value::from(location.end_line));
    key.insert("end_column", Value::from(location.end_column));

    // A BTreeMap of JSON values always serializes
    let canonical = serde_json::to_string(&key).unwrap_or_default();
    sha256_hex(&canonical)
}

/// Browser link to the line holding the placeholder
pub fn debug_url(commit: &CommitRef, location: &Location) -> String {
    let base = commit.remote.trim_end_matches('/');
    let base = base.strip_suffix(".git").unwrap_or(base);
    format!(
        "{}/blob/{}/{}#L{}",
        base, commit.commit, location.file, location.start_line
    )
}

/// Builds records for one run. The inclusion date is fixed at construction,
/// so `build` depends only on its arguments.
#[derive(Debug, Clone, Copy)]
pub struct SorryRecordFactory {
    inclusion_date: OffsetDateTime,
}

impl SorryRecordFactory {
    pub fn new(inclusion_date: OffsetDateTime) -> Self {
        Self { inclusion_date }
    }

    pub fn build(&self, commit: &CommitRef, location: Location, goal: String, blame: BlameInfo) -> SorryRecord {
        let id = sorry_id(commit, &location);
        let url = debug_url(commit, &location);
        SorryRecord {
            repo: commit.clone(),
            location,
            debug_info: DebugInfo { goal, url },
            metadata: Metadata {
                blame_commit: blame.commit_sha,
                blame_email_hash: blame.author_email_hash,
                blame_date: blame.date,
                inclusion_date: self.inclusion_date,
            },
            id,
        }
    }
}
