//! Remote branch probing without a full clone

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use git2::{Direction, FetchOptions, Remote, RemoteCallbacks, Repository};
use time::OffsetDateTime;

use crate::error::CrawlError;
use crate::model::RepoEntry;
use crate::util::{datetime_from_git, short_digest};

const HEADS_PREFIX: &str = "refs/heads/";
const FETCHED_PREFIX: &str = "refs/remotes/origin/";

/// A branch tip as advertised by the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHead {
    pub branch: String,
    pub sha: String,
}

/// A branch tip together with its commit time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCommit {
    pub branch: String,
    pub sha: String,
    pub committed_at: OffsetDateTime,
}

/// Read-only view of a remote's branches.
#[async_trait]
pub trait RemoteProbe: Send + Sync {
    /// Branch tips, without transferring any objects.
    async fn list_heads(&self, remote_url: &str) -> Result<Vec<RemoteHead>, CrawlError>;

    /// Branch tips with commit times. Fetches the tip commits only.
    async fn leaf_commits(&self, remote_url: &str) -> Result<Vec<LeafCommit>, CrawlError>;
}

/// git2-backed probe. Every call runs on the blocking pool under `timeout`.
#[derive(Debug, Clone)]
pub struct GitRemote {
    timeout: Duration,
}

impl GitRemote {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run_blocking<T, F>(&self, remote_url: &str, op: F) -> Result<T, CrawlError>
    where
        T: Send + 'static,
        F: FnOnce(Instant) -> Result<T, git2::Error> + Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let task = tokio::task::spawn_blocking(move || op(deadline));

        let unreachable = |reason: String| CrawlError::TransientNetwork {
            remote: remote_url.to_string(),
            reason,
        };
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(unreachable(e.message().to_string())),
            Ok(Err(join)) => Err(unreachable(format!("probe task failed: {}", join))),
            Err(_) => Err(unreachable(format!("timed out after {:?}", self.timeout))),
        }
    }
}

#[async_trait]
impl RemoteProbe for GitRemote {
    async fn list_heads(&self, remote_url: &str) -> Result<Vec<RemoteHead>, CrawlError> {
        let url = remote_url.to_string();
        self.run_blocking(remote_url, move |_| {
            let mut remote = Remote::create_detached(url)?;
            remote.connect(Direction::Fetch)?;
            let mut heads: Vec<RemoteHead> = remote
                .list()?
                .iter()
                .filter_map(|head| {
                    head.name().strip_prefix(HEADS_PREFIX).map(|branch| RemoteHead {
                        branch: branch.to_string(),
                        sha: head.oid().to_string(),
                    })
                })
                .collect();
            remote.disconnect()?;
            heads.sort_by(|a, b| a.branch.cmp(&b.branch));
            Ok(heads)
        })
        .await
    }

    async fn leaf_commits(&self, remote_url: &str) -> Result<Vec<LeafCommit>, CrawlError> {
        let url = remote_url.to_string();
        let scratch = tempfile::tempdir()?;
        self.run_blocking(remote_url, move |deadline| {
            let repo = Repository::init_bare(scratch.path())?;
            let mut remote = repo.remote_anonymous(&url)?;

            let mut callbacks = RemoteCallbacks::new();
            callbacks.transfer_progress(move |_| Instant::now() < deadline);
            let mut options = FetchOptions::new();
            options.remote_callbacks(callbacks);
            // The local transport rejects shallow fetches
            if !is_local_url(&url) {
                options.depth(1);
            }
            remote.fetch(&["+refs/heads/*:refs/remotes/origin/*"], Some(&mut options), None)?;

            let mut leaves = Vec::new();
            for reference in repo.references_glob("refs/remotes/origin/*")? {
                let reference = reference?;
                let Some(branch) = reference.name().and_then(|n| n.strip_prefix(FETCHED_PREFIX)) else {
                    continue;
                };
                let branch = branch.to_string();
                let commit = reference.peel_to_commit()?;
                leaves.push(LeafCommit {
                    branch,
                    sha: commit.id().to_string(),
                    committed_at: datetime_from_git(commit.time()),
                });
            }
            leaves.sort_by(|a, b| a.branch.cmp(&b.branch));
            Ok(leaves)
        })
        .await
    }
}

fn is_local_url(url: &str) -> bool {
    url.starts_with("file://") || Path::new(url).exists()
}

/// Digest of the set of branch tips: sorted distinct shas joined by `_`,
/// first 12 hex chars of their SHA-256. `None` when there are no heads.
pub fn combined_head_digest(heads: &[RemoteHead]) -> Option<String> {
    if heads.is_empty() {
        return None;
    }
    let shas: BTreeSet<&str> = heads.iter().map(|h| h.sha.as_str()).collect();
    let joined = shas.into_iter().collect::<Vec<_>>().join("_");
    Some(short_digest(&joined))
}

/// Result of a cheap remote probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub digest: String,
    pub changed: bool,
}

/// Decides whether a repository needs a deep crawl by comparing the current
/// head digest with the one stored at the last visit.
#[derive(Clone)]
pub struct ChangeDetector {
    probe: Arc<dyn RemoteProbe>,
}

impl ChangeDetector {
    pub fn new(probe: Arc<dyn RemoteProbe>) -> Self {
        Self { probe }
    }

    pub fn probe(&self) -> &Arc<dyn RemoteProbe> {
        &self.probe
    }

    pub async fn needs_deep_crawl(&self, entry: &RepoEntry) -> Result<Probe, CrawlError> {
        let heads = self.probe.list_heads(&entry.remote_url).await?;
        let digest = combined_head_digest(&heads).ok_or_else(|| CrawlError::TransientNetwork {
            remote: entry.remote_url.clone(),
            reason: "remote advertises no branches".to_string(),
        })?;
        let changed = entry.remote_heads_hash.as_deref() != Some(digest.as_str());
        Ok(Probe { digest, changed })
    }
}

/// Branch tips committed strictly after the last visit, by branch name.
pub fn enumerate_new_leaf_commits(entry: &RepoEntry, leaves: Vec<LeafCommit>) -> Vec<LeafCommit> {
    let mut fresh: Vec<LeafCommit> = leaves
        .into_iter()
        .filter(|leaf| leaf.committed_at > entry.last_time_visited)
        .collect();
    fresh.sort_by(|a, b| a.branch.cmp(&b.branch));
    fresh
}
