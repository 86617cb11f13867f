// Shared test fixtures for integration tests
// Functions here are used across different test files
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use git2::{Repository, Signature, Time};
use rustc_hash::FxHashMap;
use tempfile::TempDir;
use time::OffsetDateTime;

use sorrydb::crawler::{CrawlContext, Crawler};
use sorrydb::error::{CrawlError, ExtractionError};
use sorrydb::extract::{ExtractedGoal, GoalExtractor};
use sorrydb::model::{BlameInfo, CommitRef, Location};
use sorrydb::repository::{ChangeDetector, LeafCommit, RemoteHead, RemoteProbe};
use sorrydb::workspace::{Workspace, WorkspaceBuilder};

// ---------------------------------------------------------------------------
// Real git repositories

/// Create a temporary git repository
pub fn create_test_repo() -> (TempDir, PathBuf, Repository) {
    let dir = TempDir::new().unwrap();
    let repo_path = dir.path().to_path_buf();
    let repo = Repository::init(&repo_path).unwrap();

    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test User").unwrap();
    config.set_str("user.email", "test@example.com").unwrap();

    (dir, repo_path, repo)
}

/// Write files and commit them on HEAD as `email`, dated `seconds` since the epoch
pub fn add_commit_as(
    repo: &Repository,
    files: &[(&str, &str)],
    message: &str,
    email: &str,
    seconds: i64,
) -> git2::Oid {
    let sig = Signature::new("Test User", email, &Time::new(seconds, 0)).unwrap();
    let mut index = repo.index().unwrap();

    for (path, content) in files {
        let full_path = repo.workdir().unwrap().join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&full_path, content).unwrap();
        index.add_path(Path::new(path)).unwrap();
    }

    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());

    match parent {
        Some(parent) => repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent]).unwrap(),
        None => repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[]).unwrap(),
    }
}

pub fn add_commit(repo: &Repository, files: &[(&str, &str)], message: &str) -> git2::Oid {
    add_commit_as(repo, files, message, "test@example.com", OffsetDateTime::now_utc().unix_timestamp())
}

/// Name of the branch HEAD points at
pub fn head_branch(repo: &Repository) -> String {
    repo.head().unwrap().shorthand().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Scripted capabilities

pub fn leaf(branch: &str, sha: &str, committed_at: OffsetDateTime) -> LeafCommit {
    LeafCommit {
        branch: branch.to_string(),
        sha: sha.to_string(),
        committed_at,
    }
}

pub fn goal(file: &str, line: u32, text: &str) -> ExtractedGoal {
    ExtractedGoal {
        location: Location {
            start_line: line,
            start_column: 3,
            end_line: line,
            end_column: 8,
            file: file.to_string(),
        },
        goal: text.to_string(),
    }
}

/// Remote whose branches are set by the test
#[derive(Default)]
pub struct FakeRemote {
    leaves: Mutex<FxHashMap<String, Vec<LeafCommit>>>,
    unreachable: Mutex<Vec<String>>,
    pub list_calls: AtomicUsize,
    pub leaf_calls: AtomicUsize,
}

impl FakeRemote {
    pub fn set_leaves(&self, url: &str, leaves: Vec<LeafCommit>) {
        self.leaves.lock().unwrap().insert(url.to_string(), leaves);
    }

    pub fn set_unreachable(&self, url: &str) {
        self.unreachable.lock().unwrap().push(url.to_string());
    }

    fn check(&self, url: &str) -> Result<Vec<LeafCommit>, CrawlError> {
        if self.unreachable.lock().unwrap().iter().any(|u| u == url) {
            return Err(CrawlError::TransientNetwork {
                remote: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(self.leaves.lock().unwrap().get(url).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl RemoteProbe for FakeRemote {
    async fn list_heads(&self, remote_url: &str) -> Result<Vec<RemoteHead>, CrawlError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .check(remote_url)?
            .into_iter()
            .map(|l| RemoteHead {
                branch: l.branch,
                sha: l.sha,
            })
            .collect())
    }

    async fn leaf_commits(&self, remote_url: &str) -> Result<Vec<LeafCommit>, CrawlError> {
        self.leaf_calls.fetch_add(1, Ordering::SeqCst);
        self.check(remote_url)
    }
}

#[derive(Debug, Clone)]
pub enum BuildScript {
    Succeeds,
    Fails,
    TimesOut,
}

/// What a checkout of one commit contains
#[derive(Debug, Clone)]
pub struct CommitScript {
    pub build: BuildScript,
    pub lean_version: String,
    /// File -> goals, or an extraction failure message
    pub files: Vec<(String, Result<Vec<ExtractedGoal>, String>)>,
}

impl CommitScript {
    pub fn with_files(files: Vec<(&str, Vec<ExtractedGoal>)>) -> Self {
        Self {
            build: BuildScript::Succeeds,
            lean_version: "v4.9.0".to_string(),
            files: files.into_iter().map(|(f, g)| (f.to_string(), Ok(g))).collect(),
        }
    }

    pub fn build(mut self, build: BuildScript) -> Self {
        self.build = build;
        self
    }

    pub fn failing_file(mut self, file: &str) -> Self {
        self.files.push((file.to_string(), Err("REPL crashed".to_string())));
        self
    }
}

/// Builder serving scripted commits keyed by sha
#[derive(Default)]
pub struct FakeBuilder {
    commits: Mutex<FxHashMap<String, CommitScript>>,
    pub checkouts: AtomicUsize,
}

impl FakeBuilder {
    pub fn set_commit(&self, sha: &str, script: CommitScript) {
        self.commits.lock().unwrap().insert(sha.to_string(), script);
    }
}

#[async_trait]
impl WorkspaceBuilder for FakeBuilder {
    async fn checkout(&self, remote_url: &str, leaf: &LeafCommit) -> Result<Box<dyn Workspace>, CrawlError> {
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        let script = self.commits.lock().unwrap().get(&leaf.sha).cloned().ok_or_else(|| CrawlError::Clone {
            remote: remote_url.to_string(),
            sha: leaf.sha.clone(),
            reason: "no such commit".to_string(),
        })?;
        Ok(Box::new(FakeWorkspace {
            commit: CommitRef {
                remote: remote_url.to_string(),
                branch: leaf.branch.clone(),
                commit: leaf.sha.clone(),
                lean_version: script.lean_version.clone(),
            },
            script,
        }))
    }
}

pub struct FakeWorkspace {
    commit: CommitRef,
    script: CommitScript,
}

pub fn blame_for(sha: &str, line: u32) -> BlameInfo {
    BlameInfo {
        commit_sha: format!("{}-blame-{}", sha, line),
        author_email_hash: "0123456789ab".to_string(),
        date: OffsetDateTime::from_unix_timestamp(1_700_000_000 + i64::from(line)).unwrap(),
    }
}

#[async_trait]
impl Workspace for FakeWorkspace {
    fn commit(&self) -> &CommitRef {
        &self.commit
    }

    async fn build(&mut self) -> Result<(), CrawlError> {
        match self.script.build {
            BuildScript::Succeeds => Ok(()),
            BuildScript::Fails => Err(CrawlError::Build("lake build exited with 1".to_string())),
            BuildScript::TimesOut => Err(CrawlError::BuildTimeout(std::time::Duration::from_secs(5))),
        }
    }

    async fn source_files(&self) -> Result<Vec<PathBuf>, CrawlError> {
        let mut files: Vec<PathBuf> = self.script.files.iter().map(|(f, _)| PathBuf::from(f)).collect();
        files.sort();
        Ok(files)
    }

    async fn blame(&self, _file: &Path, line: u32) -> Result<BlameInfo, CrawlError> {
        Ok(blame_for(&self.commit.commit, line))
    }

    async fn goal_extractor(&self) -> Result<Box<dyn GoalExtractor>, CrawlError> {
        let answers = self
            .script
            .files
            .iter()
            .map(|(f, r)| (PathBuf::from(f), r.clone()))
            .collect();
        Ok(Box::new(FakeExtractor { answers }))
    }
}

pub struct FakeExtractor {
    answers: FxHashMap<PathBuf, Result<Vec<ExtractedGoal>, String>>,
}

#[async_trait]
impl GoalExtractor for FakeExtractor {
    async fn extract(&mut self, file: &Path) -> Result<Vec<ExtractedGoal>, ExtractionError> {
        match self.answers.get(file) {
            Some(Ok(goals)) => Ok(goals.clone()),
            Some(Err(reason)) => Err(ExtractionError::ProcessExited(reason.clone())),
            None => Err(ExtractionError::Tool(format!("unknown file {}", file.display()))),
        }
    }
}

/// Fakes plus a crawler wired to them
pub struct Harness {
    pub remote: Arc<FakeRemote>,
    pub builder: Arc<FakeBuilder>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            remote: Arc::new(FakeRemote::default()),
            builder: Arc::new(FakeBuilder::default()),
        }
    }

    pub fn crawler(&self, workers: usize) -> Crawler {
        let ctx = CrawlContext {
            detector: ChangeDetector::new(self.remote.clone()),
            builder: self.builder.clone(),
        };
        Crawler::new(ctx, workers)
    }

    pub fn checkouts(&self) -> usize {
        self.builder.checkouts.load(Ordering::SeqCst)
    }
}
