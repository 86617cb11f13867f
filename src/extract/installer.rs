//! Per-toolchain REPL installation cache

use std::path::{Path, PathBuf};
use std::time::Duration;

use git2::build::{CheckoutBuilder, RepoBuilder};
use tokio::sync::Mutex;

use crate::error::CrawlError;
use crate::workspace::run_lake;

pub const REPL_REPO_URL: &str = "https://github.com/leanprover-community/repl";

/// Clones and builds the REPL once per toolchain version.
///
/// Installs are serialised so concurrent workers never build into the same
/// directory.
pub struct ReplInstaller {
    root: PathBuf,
    source_url: String,
    build_timeout: Duration,
    guard: Mutex<()>,
}

impl ReplInstaller {
    pub fn new(root: PathBuf, build_timeout: Duration) -> Self {
        Self {
            root,
            source_url: REPL_REPO_URL.to_string(),
            build_timeout,
            guard: Mutex::new(()),
        }
    }

    /// `<cache dir>/sorrydb`, or the temp dir when no cache dir is known
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("sorrydb")
    }

    pub fn install_dir(&self, version: &str) -> PathBuf {
        if version.is_empty() {
            self.root.join("repl")
        } else {
            self.root.join(format!("repl_{}", version.replace(['.', '-'], "_")))
        }
    }

    pub fn binary_path(install_dir: &Path) -> PathBuf {
        install_dir.join(".lake").join("build").join("bin").join("repl")
    }

    /// Path of a built REPL binary for `version`, installing it if needed
    pub async fn ensure(&self, version: &str) -> Result<PathBuf, CrawlError> {
        let _held = self.guard.lock().await;

        let dir = self.install_dir(version);
        let binary = Self::binary_path(&dir);
        if binary.is_file() {
            return Ok(binary);
        }
        if dir.exists() {
            tracing::warn!(dir = %dir.display(), "removing incomplete REPL install");
            std::fs::remove_dir_all(&dir)?;
        }

        tracing::info!(version, dir = %dir.display(), "installing REPL");
        if let Err(e) = self.install(version, &dir).await {
            let _ = std::fs::remove_dir_all(&dir);
            return Err(e);
        }
        if !binary.is_file() {
            let _ = std::fs::remove_dir_all(&dir);
            return Err(CrawlError::Build(format!(
                "REPL binary missing after build: {}",
                binary.display()
            )));
        }
        Ok(binary)
    }

    async fn install(&self, version: &str, dir: &Path) -> Result<(), CrawlError> {
        std::fs::create_dir_all(&self.root)?;

        let url = self.source_url.clone();
        let tag = version.to_string();
        let target = dir.to_path_buf();
        let clone_error = |reason: String| CrawlError::Clone {
            remote: self.source_url.clone(),
            sha: version.to_string(),
            reason,
        };

        tokio::task::spawn_blocking(move || -> Result<(), git2::Error> {
            let repo = RepoBuilder::new().clone(&url, &target)?;
            if !tag.is_empty() {
                let commit = repo
                    .revparse_single(&format!("refs/tags/{}", tag))?
                    .peel_to_commit()?;
                repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
                repo.set_head_detached(commit.id())?;
            }
            Ok(())
        })
        .await
        .map_err(|e| clone_error(e.to_string()))?
        .map_err(|e| clone_error(e.message().to_string()))?;

        run_lake(dir, &["build"], self.build_timeout).await
    }
}
