//! Durable per-repository visit bookkeeping

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{StoreError, StoreResult};
use crate::model::RepoEntry;

/// Tracked repositories, keyed by `remote_url`, in registration order.
///
/// Serialized transparently as the `repos` collection of the database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoRegistry {
    entries: Vec<RepoEntry>,
}

impl RepoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new repository with `cutoff` as its first visit time.
    pub fn add_repo(&mut self, remote_url: &str, cutoff: OffsetDateTime) -> StoreResult<&RepoEntry> {
        if self.get(remote_url).is_some() {
            return Err(StoreError::DuplicateRepo(remote_url.to_string()));
        }
        self.entries.push(RepoEntry::new(remote_url, cutoff));
        let last = self.entries.len() - 1;
        Ok(&self.entries[last])
    }

    pub fn get(&self, remote_url: &str) -> Option<&RepoEntry> {
        self.entries.iter().find(|e| e.remote_url == remote_url)
    }

    /// Insert or replace the entry with the same `remote_url`.
    pub fn upsert(&mut self, entry: RepoEntry) {
        match self.entries.iter_mut().find(|e| e.remote_url == entry.remote_url) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Record a successful probe. Both fields move together; repeating the
    /// same call leaves the entry unchanged.
    ///
    /// Returns false if the repository is not tracked.
    pub fn record_visit(&mut self, remote_url: &str, heads_hash: &str, visited_at: OffsetDateTime) -> bool {
        match self.entries.iter_mut().find(|e| e.remote_url == remote_url) {
            Some(entry) => {
                entry.remote_heads_hash = Some(heads_hash.to_string());
                entry.last_time_visited = visited_at;
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[RepoEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
