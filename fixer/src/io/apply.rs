//! Applying accepted suggestions to the working tree.
//!
//! Not transactional: the backup is written before the target, and nothing is
//! rolled back automatically. Restoring from `<file>.backup` is a manual step.

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::suggestion::{FixKind, FixSuggestion};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("suggested command is empty or cannot be parsed: {command:?}")]
    EmptyCommand { command: String },
}

/// What applying a suggestion changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedFix {
    /// A file was rewritten; `backup` holds the previous content when there was any.
    File {
        path: PathBuf,
        backup: Option<PathBuf>,
    },
    /// The command to retry with.
    Command { args: Vec<String> },
}

/// Sibling backup location: `<original>.backup`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".backup");
    PathBuf::from(name)
}

/// Apply `suggestion`, resolving relative targets against `cwd`.
#[instrument(skip_all, fields(kind = suggestion.kind.label()))]
pub fn apply_suggestion(suggestion: &FixSuggestion, cwd: &Path) -> Result<AppliedFix, ApplyError> {
    match &suggestion.kind {
        FixKind::Command { command, .. } => {
            let args = shell_words::split(command)
                .ok()
                .filter(|args| !args.is_empty())
                .ok_or_else(|| ApplyError::EmptyCommand {
                    command: command.clone(),
                })?;
            info!(command = %command, "replacing command");
            Ok(AppliedFix::Command { args })
        }
        FixKind::File { path, content, .. } => write_with_backup(&cwd.join(path), content),
        FixKind::Config { target, content } => write_with_backup(&cwd.join(target), content),
    }
}

/// Back up the current content of `path` (if any), then overwrite it.
///
/// A backup that cannot be taken is logged and skipped; it never blocks the write.
pub fn write_with_backup(path: &Path, content: &str) -> Result<AppliedFix, ApplyError> {
    let backup = match fs::read(path) {
        Ok(previous) => {
            let backup = backup_path(path);
            match fs::write(&backup, previous) {
                Ok(()) => Some(backup),
                Err(err) => {
                    warn!(path = %backup.display(), err = %err, "failed to write backup");
                    None
                }
            }
        }
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "failed to read file for backup");
            None
        }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ApplyError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, content).map_err(|source| ApplyError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), backup = ?backup, "applied file fix");

    Ok(AppliedFix::File {
        path: path.to_path_buf(),
        backup,
    })
}
