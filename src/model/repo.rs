use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Visit bookkeeping for one tracked remote
///
/// `remote_heads_hash` is always the digest of the branch tips observed at
/// `last_time_visited`; the two fields are only ever updated together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoEntry {
    pub remote_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_time_visited: OffsetDateTime,
    pub remote_heads_hash: Option<String>,
}

impl RepoEntry {
    /// A freshly registered repository: nothing observed yet.
    pub fn new(remote_url: impl Into<String>, cutoff: OffsetDateTime) -> Self {
        Self {
            remote_url: remote_url.into(),
            last_time_visited: cutoff,
            remote_heads_hash: None,
        }
    }
}
