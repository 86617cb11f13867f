//! Line-oriented JSON protocol of the Lean REPL
//!
//! A request is one JSON object followed by a blank line. A response is one
//! JSON object terminated by a blank line or end of stream.

use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

#[derive(Debug, Clone, Serialize)]
pub struct FileRequest<'a> {
    pub path: &'a str,
    #[serde(rename = "allTactics")]
    pub all_tactics: bool,
}

impl<'a> FileRequest<'a> {
    pub fn new(path: &'a str) -> Self {
        Self {
            path,
            all_tactics: true,
        }
    }

    /// Wire form, including the blank-line terminator
    pub fn encode(&self) -> Result<String, ExtractionError> {
        let body = serde_json::to_string(self).map_err(|e| ExtractionError::Malformed(e.to_string()))?;
        Ok(format!("{}\n\n", body))
    }
}

/// REPL position: line is 1-based, column is 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplSorry {
    #[serde(rename = "proofState", default)]
    pub proof_state: Option<u64>,
    pub pos: Position,
    #[serde(rename = "endPos")]
    pub end_pos: Position,
    pub goal: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawResponse {
    #[serde(default)]
    sorries: Vec<ReplSorry>,
    #[serde(default)]
    messages: Vec<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// A successful file response
#[derive(Debug, Clone, PartialEq)]
pub struct ReplResponse {
    pub sorries: Vec<ReplSorry>,
    /// Number of diagnostics the elaborator attached
    pub diagnostics: usize,
}

impl ReplResponse {
    pub fn parse(text: &str) -> Result<Self, ExtractionError> {
        let raw: RawResponse =
            serde_json::from_str(text.trim()).map_err(|e| ExtractionError::Malformed(e.to_string()))?;
        if let Some(error) = raw.error.or(raw.message) {
            return Err(ExtractionError::Tool(error));
        }
        Ok(Self {
            sorries: raw.sorries,
            diagnostics: raw.messages.len(),
        })
    }
}
