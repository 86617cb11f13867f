//! Error types for the crawler and the database store.

use std::path::PathBuf;
use std::time::Duration;

use crate::crawler::RepoState;

/// Failures scoped to a single repository crawl.
///
/// None of these abort a run: the orchestrator converts them into a
/// terminal [`RepoState`] and a statistics entry.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("remote {remote} unreachable: {reason}")]
    TransientNetwork { remote: String, reason: String },

    #[error("clone of {remote} at {sha} failed: {reason}")]
    Clone {
        remote: String,
        sha: String,
        reason: String,
    },

    #[error("build failed: {0}")]
    Build(String),

    #[error("build timed out after {0:?}")]
    BuildTimeout(Duration),

    #[error("goal extraction unavailable: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// The terminal state a repository ends in when this error stops it.
    pub fn terminal_state(&self) -> RepoState {
        match self {
            CrawlError::TransientNetwork { .. } | CrawlError::Clone { .. } => RepoState::Unreachable,
            CrawlError::BuildTimeout(_) => RepoState::BuildTimedOut,
            CrawlError::Build(_)
            | CrawlError::Extraction(_)
            | CrawlError::Git(_)
            | CrawlError::Io(_) => RepoState::BuildFailed,
        }
    }
}

/// Failures of a single goal-extraction request. Scoped to one file.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to start goal extractor: {0}")]
    Spawn(String),

    #[error("extraction of {file} timed out after {after:?}")]
    Timeout { file: String, after: Duration },

    #[error("goal extractor exited: {0}")]
    ProcessExited(String),

    #[error("malformed extractor response: {0}")]
    Malformed(String),

    #[error("extractor reported an error: {0}")]
    Tool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Store-level failures. These are fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database file not found: {0}")]
    NotFound(PathBuf),

    #[error("corrupt database {path}: {reason}")]
    CorruptDatabase { path: PathBuf, reason: String },

    #[error("repository already tracked: {0}")]
    DuplicateRepo(String),

    #[error("repository list is empty: {0}")]
    EmptyRepoList(PathBuf),

    #[error("invalid repository list {path}: {reason}")]
    InvalidRepoList { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Invalid or unreadable configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
