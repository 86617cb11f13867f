//! Built checkouts of a single leaf commit
//!
//! A [`WorkspaceBuilder`] turns a `(remote, leaf commit)` pair into a
//! [`Workspace`]: a private checkout that can be built, listed, blamed and
//! handed to a goal extractor. Dropping the workspace removes the checkout.

mod blame;
mod checkout;
mod lake;
mod sources;

pub use blame::blame_line;
pub use checkout::{LakeWorkspaceBuilder, LocalWorkspace};
pub use lake::{parse_toolchain, read_toolchain, uses_mathlib};
pub(crate) use lake::run_lake;
pub use sources::find_source_files;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::CrawlError;
use crate::extract::GoalExtractor;
use crate::model::{BlameInfo, CommitRef};
use crate::repository::LeafCommit;

#[async_trait]
pub trait Workspace: Send + Sync {
    fn commit(&self) -> &CommitRef;

    /// Compile the project. Must succeed before goals can be extracted.
    async fn build(&mut self) -> Result<(), CrawlError>;

    /// Candidate source files, relative to the checkout root, sorted
    async fn source_files(&self) -> Result<Vec<PathBuf>, CrawlError>;

    async fn blame(&self, file: &Path, line: u32) -> Result<BlameInfo, CrawlError>;

    /// A fresh extractor bound to this checkout
    async fn goal_extractor(&self) -> Result<Box<dyn GoalExtractor>, CrawlError>;
}

#[async_trait]
pub trait WorkspaceBuilder: Send + Sync {
    /// Check out `leaf` of `remote_url` into a private directory, unbuilt.
    async fn checkout(&self, remote_url: &str, leaf: &LeafCommit) -> Result<Box<dyn Workspace>, CrawlError>;

    /// Check out and build in one step.
    async fn materialize(&self, remote_url: &str, leaf: &LeafCommit) -> Result<Box<dyn Workspace>, CrawlError> {
        let mut workspace = self.checkout(remote_url, leaf).await?;
        workspace.build().await?;
        Ok(workspace)
    }
}
