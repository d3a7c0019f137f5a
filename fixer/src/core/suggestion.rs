//! Typed fix suggestions produced by the external suggestion step.
//!
//! Each kind carries exactly its own payload, so consumers match exhaustively
//! instead of probing optional fields.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The variant-specific part of a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixKind {
    /// Replace the command being retried.
    Command {
        command: String,
        explanation: Option<String>,
    },
    /// Replace the full content of a file.
    File {
        path: PathBuf,
        content: String,
        explanation: Option<String>,
    },
    /// Replace a build/config descriptor such as a Dockerfile.
    Config { target: PathBuf, content: String },
}

impl FixKind {
    pub fn label(&self) -> &'static str {
        match self {
            FixKind::Command { .. } => "command",
            FixKind::File { .. } => "file",
            FixKind::Config { .. } => "config",
        }
    }
}

/// A structured proposal for fixing a failure.
///
/// `confidence` is advisory: the loop never rejects a suggestion for being unsure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub kind: FixKind,
    pub reason: String,
    pub changes_summary: String,
    pub confidence: f64,
}
