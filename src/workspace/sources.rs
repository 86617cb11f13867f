use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::CrawlError;

const SKIPPED_DIRS: &[&str] = &[".lake", ".git"];

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_str().is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

/// `*.lean` files under `root` that mention `sorry`, as sorted relative paths.
///
/// Build output under `.lake/` is never scanned.
pub fn find_source_files(root: &Path) -> Result<Vec<PathBuf>, CrawlError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_entry(|e| !is_skipped(e)) {
        let entry = entry.map_err(|e| CrawlError::Io(e.into()))?;
        if !entry.file_type().is_file() || entry.path().extension().is_none_or(|ext| ext != "lean") {
            continue;
        }
        let bytes = std::fs::read(entry.path())?;
        if !String::from_utf8_lossy(&bytes).contains("sorry") {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}
