use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::protocol::{FileRequest, ReplResponse};
use super::{ExtractedGoal, GoalExtractor, finalize_goals};
use crate::error::ExtractionError;

/// A running REPL process
struct Session {
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Session {
    async fn round_trip(&mut self, wire: &str) -> Result<String, ExtractionError> {
        self.stdin.write_all(wire.as_bytes()).await?;
        self.stdin.flush().await?;

        let mut body = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.stdout.read_line(&mut line).await?;
            if read == 0 {
                if body.trim().is_empty() {
                    return Err(ExtractionError::ProcessExited(
                        "stream closed before a response".to_string(),
                    ));
                }
                break;
            }
            if line.trim().is_empty() {
                if body.trim().is_empty() {
                    continue;
                }
                break;
            }
            body.push_str(&line);
        }
        Ok(body)
    }
}

/// Goal extractor backed by one long-lived REPL process per workspace.
///
/// The process starts on the first request. Any failed request kills it;
/// the next request starts a fresh one.
pub struct ReplGoalExtractor {
    root: PathBuf,
    program: OsString,
    args: Vec<OsString>,
    timeout: Duration,
    session: Option<Session>,
}

impl ReplGoalExtractor {
    /// Run `repl_binary` inside the project environment via `lake env`
    pub fn new(root: &Path, repl_binary: &Path, timeout: Duration) -> Self {
        Self::with_command(root, "lake", [OsString::from("env"), repl_binary.as_os_str().to_owned()], timeout)
    }

    /// Run an arbitrary command speaking the REPL protocol
    pub fn with_command<I, S>(root: &Path, program: impl Into<OsString>, args: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            root: root.to_path_buf(),
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout,
            session: None,
        }
    }

    fn spawn(&self) -> Result<Session, ExtractionError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExtractionError::Spawn(format!("{}: {}", self.program.to_string_lossy(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExtractionError::Spawn("REPL stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractionError::Spawn("REPL stdout unavailable".to_string()))?;

        tracing::debug!(root = %self.root.display(), "started REPL session");
        Ok(Session {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    async fn request(&mut self, file: &Path) -> Result<ReplResponse, ExtractionError> {
        let path = file.to_string_lossy();
        let wire = FileRequest::new(&path).encode()?;

        if self.session.is_none() {
            self.session = Some(self.spawn()?);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(ExtractionError::Spawn("REPL session unavailable".to_string()));
        };

        let body = match tokio::time::timeout(self.timeout, session.round_trip(&wire)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ExtractionError::Timeout {
                    file: path.into_owned(),
                    after: self.timeout,
                });
            }
        };
        ReplResponse::parse(&body)
    }
}

#[async_trait]
impl GoalExtractor for ReplGoalExtractor {
    async fn extract(&mut self, file: &Path) -> Result<Vec<ExtractedGoal>, ExtractionError> {
        match self.request(file).await {
            Ok(response) => Ok(finalize_goals(file, response.sorries)),
            // The REPL answered, so the session is still usable
            Err(e @ ExtractionError::Tool(_)) => Err(e),
            Err(e) => {
                // Dropping the session kills the process
                if self.session.take().is_some() {
                    tracing::debug!(file = %file.display(), error = %e, "discarding REPL session");
                }
                Err(e)
            }
        }
    }
}
