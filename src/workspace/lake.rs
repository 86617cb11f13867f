//! `lake` invocations and project metadata files

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::CrawlError;

const MATHLIB_URL: &str = "https://github.com/leanprover-community/mathlib4";
const STDERR_TAIL: usize = 2000;

/// Run `lake <args>` in `root`, killing it once `budget` is spent.
pub(crate) async fn run_lake(root: &Path, args: &[&str], budget: Duration) -> Result<(), CrawlError> {
    let command = format!("lake {}", args.join(" "));
    tracing::debug!(root = %root.display(), %command, "running");

    let child = Command::new("lake")
        .args(args)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CrawlError::Build(format!("failed to start {}: {}", command, e)))?;

    match tokio::time::timeout(budget, child.wait_with_output()).await {
        Err(_) => Err(CrawlError::BuildTimeout(budget)),
        Ok(Err(e)) => Err(CrawlError::Io(e)),
        Ok(Ok(output)) if output.status.success() => Ok(()),
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(CrawlError::Build(format!(
                "{} exited with {}: {}",
                command,
                output.status,
                tail(stderr.trim(), STDERR_TAIL)
            )))
        }
    }
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Whether the manifest pins mathlib, so the prebuilt cache is worth fetching
pub fn uses_mathlib(manifest: &str) -> bool {
    manifest.contains(MATHLIB_URL) || manifest.contains("\"name\": \"mathlib\"")
}

/// Version part of a `lean-toolchain` line, e.g. `leanprover/lean4:v4.17.0` -> `v4.17.0`
pub fn parse_toolchain(contents: &str) -> String {
    let line = contents.trim();
    match line.split_once(':') {
        Some((_, version)) => version.trim().to_string(),
        None => line.to_string(),
    }
}

/// Toolchain version of the project at `root`; empty if there is no `lean-toolchain`
pub fn read_toolchain(root: &Path) -> String {
    match std::fs::read_to_string(root.join("lean-toolchain")) {
        Ok(contents) => parse_toolchain(&contents),
        Err(_) => String::new(),
    }
}
