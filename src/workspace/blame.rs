use std::path::Path;

use git2::{BlameOptions, Repository};

use crate::error::CrawlError;
use crate::model::BlameInfo;
use crate::util::{datetime_from_git, short_digest};

/// Attribute a single line of `file` (relative to the repository root) as of HEAD.
///
/// The author email is reduced to a short digest before it leaves this function.
pub fn blame_line(repo_root: &Path, file: &Path, line: u32) -> Result<BlameInfo, CrawlError> {
    let repo = Repository::open(repo_root)?;
    let head = repo.head()?.peel_to_commit()?.id();

    let mut options = BlameOptions::new();
    options
        .newest_commit(head)
        .min_line(line as usize)
        .max_line(line as usize);
    let blame = repo.blame_file(file, Some(&mut options))?;

    let hunk = blame.get_line(line as usize).ok_or_else(|| {
        git2::Error::from_str(&format!("no blame for {}:{}", file.display(), line))
    })?;
    let commit_id = hunk.final_commit_id();

    let commit = repo.find_commit(commit_id)?;
    let author = commit.author();
    Ok(BlameInfo {
        commit_sha: commit_id.to_string(),
        author_email_hash: short_digest(author.email().unwrap_or_default()),
        date: datetime_from_git(author.when()),
    })
}
