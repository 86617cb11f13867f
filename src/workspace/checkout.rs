use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{FetchOptions, Oid, RemoteCallbacks};
use tempfile::TempDir;

use super::lake::{read_toolchain, run_lake, uses_mathlib};
use super::{Workspace, WorkspaceBuilder, blame_line, find_source_files};
use crate::error::CrawlError;
use crate::extract::{GoalExtractor, ReplGoalExtractor, ReplSettings};
use crate::model::{BlameInfo, CommitRef};
use crate::repository::LeafCommit;

/// Clones with git2 and builds with `lake`
pub struct LakeWorkspaceBuilder {
    scratch_root: Option<PathBuf>,
    network_timeout: Duration,
    build_timeout: Duration,
    repl: ReplSettings,
}

impl LakeWorkspaceBuilder {
    pub fn new(network_timeout: Duration, build_timeout: Duration, repl: ReplSettings) -> Self {
        Self {
            scratch_root: None,
            network_timeout,
            build_timeout,
            repl,
        }
    }

    /// Place checkouts under `root` instead of the system temp dir
    pub fn with_scratch_root(mut self, root: PathBuf) -> Self {
        self.scratch_root = Some(root);
        self
    }

    fn scratch_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sorrydb-checkout-");
        match &self.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}

#[async_trait]
impl WorkspaceBuilder for LakeWorkspaceBuilder {
    async fn checkout(&self, remote_url: &str, leaf: &LeafCommit) -> Result<Box<dyn Workspace>, CrawlError> {
        let dir = self.scratch_dir()?;
        let url = remote_url.to_string();
        let branch = leaf.branch.clone();
        let sha = leaf.sha.clone();
        let deadline = Instant::now() + self.network_timeout;

        let clone_error = |reason: String| CrawlError::Clone {
            remote: remote_url.to_string(),
            sha: leaf.sha.clone(),
            reason,
        };

        tracing::debug!(remote = remote_url, branch = %leaf.branch, sha = %leaf.sha, "cloning");
        // The checkout dir travels with the blocking task so an abandoned
        // clone never writes into a deleted directory.
        let task = tokio::task::spawn_blocking(move || -> Result<TempDir, (TempDir, git2::Error)> {
            match clone_at(&url, &branch, &sha, dir.path(), deadline) {
                Ok(()) => Ok(dir),
                Err(e) => Err((dir, e)),
            }
        });
        let dir = match tokio::time::timeout(self.network_timeout, task).await {
            Ok(Ok(Ok(dir))) => dir,
            Ok(Ok(Err((_dir, e)))) => return Err(clone_error(e.message().to_string())),
            Ok(Err(join)) => return Err(clone_error(join.to_string())),
            Err(_) => return Err(clone_error(format!("timed out after {:?}", self.network_timeout))),
        };

        let commit = CommitRef {
            remote: remote_url.to_string(),
            branch: leaf.branch.clone(),
            commit: leaf.sha.clone(),
            lean_version: read_toolchain(dir.path()),
        };
        Ok(Box::new(LocalWorkspace {
            dir,
            commit,
            build_timeout: self.build_timeout,
            repl: self.repl.clone(),
        }))
    }
}

fn clone_at(url: &str, branch: &str, sha: &str, into: &Path, deadline: Instant) -> Result<(), git2::Error> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |_| Instant::now() < deadline);
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(callbacks);

    let repo = RepoBuilder::new().branch(branch).fetch_options(fetch).clone(url, into)?;
    let oid = Oid::from_str(sha)?;
    let commit = repo.find_commit(oid)?;
    repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
    repo.set_head_detached(oid)?;
    Ok(())
}

/// Run filesystem or git2 work off the async workers
async fn on_blocking_pool<T, F>(op: F) -> Result<T, CrawlError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CrawlError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| CrawlError::Io(std::io::Error::other(e)))?
}

/// A checkout in a temporary directory, deleted on drop
pub struct LocalWorkspace {
    dir: TempDir,
    commit: CommitRef,
    build_timeout: Duration,
    repl: ReplSettings,
}

#[async_trait]
impl Workspace for LocalWorkspace {
    fn commit(&self) -> &CommitRef {
        &self.commit
    }

    async fn build(&mut self) -> Result<(), CrawlError> {
        let started = Instant::now();
        let remaining = |limit: Duration| limit.saturating_sub(started.elapsed());
        let out_of_time = |e: CrawlError| match e {
            CrawlError::BuildTimeout(_) => CrawlError::BuildTimeout(self.build_timeout),
            other => other,
        };
        let root = self.dir.path();

        let manifest = std::fs::read_to_string(root.join("lake-manifest.json")).unwrap_or_default();
        if uses_mathlib(&manifest) {
            tracing::info!(remote = %self.commit.remote, "fetching mathlib build cache");
            match run_lake(root, &["exe", "cache", "get"], remaining(self.build_timeout)).await {
                Ok(()) => {}
                Err(CrawlError::BuildTimeout(_)) => return Err(CrawlError::BuildTimeout(self.build_timeout)),
                Err(e) => tracing::warn!(error = %e, "cache fetch failed, building from source"),
            }
        }

        tracing::info!(remote = %self.commit.remote, commit = %self.commit.commit, "building");
        run_lake(root, &["build"], remaining(self.build_timeout))
            .await
            .map_err(out_of_time)?;
        tracing::debug!(elapsed = ?started.elapsed(), "build finished");
        Ok(())
    }

    async fn source_files(&self) -> Result<Vec<PathBuf>, CrawlError> {
        let root = self.dir.path().to_path_buf();
        on_blocking_pool(move || find_source_files(&root)).await
    }

    async fn blame(&self, file: &Path, line: u32) -> Result<BlameInfo, CrawlError> {
        let root = self.dir.path().to_path_buf();
        let file = file.to_path_buf();
        on_blocking_pool(move || blame_line(&root, &file, line)).await
    }

    async fn goal_extractor(&self) -> Result<Box<dyn GoalExtractor>, CrawlError> {
        let binary = match &self.repl.repl_binary {
            Some(binary) => binary.clone(),
            None => self.repl.installer.ensure(&self.commit.lean_version).await?,
        };
        Ok(Box::new(ReplGoalExtractor::new(self.dir.path(), &binary, self.repl.timeout)))
    }
}
