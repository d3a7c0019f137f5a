//! Attempt records under `<cache>/attempts/<session>/<phase>-<attempt>/`.
//!
//! These are inspection artifacts. They are never read back by the fix loop.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::core::suggestion::FixSuggestion;
use crate::core::types::Phase;

#[derive(Debug, Clone, Serialize)]
pub struct AttemptMeta {
    pub session: String,
    pub phase: Phase,
    pub attempt: u32,
    pub fingerprint: String,
    pub command: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub from_cache: bool,
    /// How the attempt ended, e.g. `fix_applied` or `suggestion_failed`.
    pub outcome: String,
    pub error: Option<String>,
    pub started_at: String,
    pub ended_at: String,
}

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub suggestion_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(session_dir: &Path, phase: Phase, attempt: u32) -> Self {
        let dir = session_dir.join(format!("{}-{attempt}", phase.as_str()));
        Self {
            meta_path: dir.join("meta.json"),
            suggestion_path: dir.join("suggestion.json"),
            dir,
        }
    }
}

/// One session's attempt log directory.
#[derive(Debug, Clone)]
pub struct AttemptLog {
    session: String,
    dir: PathBuf,
}

impl AttemptLog {
    /// Start a session named after the current time and process id.
    pub fn start(attempts_root: &Path) -> Self {
        let session = format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S"),
            std::process::id()
        );
        Self::with_session(attempts_root, session)
    }

    pub fn with_session(attempts_root: &Path, session: String) -> Self {
        Self {
            dir: attempts_root.join(&session),
            session,
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(
        &self,
        meta: &AttemptMeta,
        suggestion: Option<&FixSuggestion>,
    ) -> Result<AttemptPaths> {
        let paths = AttemptPaths::new(&self.dir, meta.phase, meta.attempt);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;
        write_json(&paths.meta_path, meta)?;
        if let Some(suggestion) = suggestion {
            write_json(&paths.suggestion_path, suggestion)?;
        }
        Ok(paths)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
