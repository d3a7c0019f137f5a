//! Content-addressed store of command results.
//!
//! Layout: `<root>/<fingerprint>/{stdout.txt,stderr.txt,meta.json}`. Entries are
//! assembled in a staging directory and renamed into place, so a reader never
//! sees a half-written entry and an aborted write leaves at most a stray
//! `.staging-*` directory behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::fingerprint::{fingerprint, is_fingerprint};
use crate::core::types::{CommandResult, CommandSpec, RestoredResult};

const STDOUT_FILE: &str = "stdout.txt";
const STDERR_FILE: &str = "stderr.txt";
const META_FILE: &str = "meta.json";
const STAGING_PREFIX: &str = ".staging-";
const TRASH_PREFIX: &str = ".trash-";
/// Reads retried when a concurrent write replaces the entry mid-read.
const READ_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no cached result for {fingerprint}")]
    NotFound { fingerprint: String },
    #[error("entry {fingerprint} kept changing while being read")]
    Contended { fingerprint: String },
    #[error("malformed fingerprint {0:?}")]
    InvalidFingerprint(String),
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("metadata {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io<'a>(
        action: &'static str,
        path: &'a Path,
    ) -> impl FnOnce(std::io::Error) -> Self + 'a {
        move |source| StoreError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The metadata artifact of an entry: everything except the raw streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub exit_code: i32,
    pub success: bool,
    #[serde(default)]
    pub timed_out: bool,
    pub command: String,
    pub cwd: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
}

impl EntryMetadata {
    fn from_result(result: &CommandResult) -> Self {
        Self {
            exit_code: result.exit_code(),
            success: result.success(),
            timed_out: result.is_timed_out(),
            command: result.command().to_string(),
            cwd: result.cwd().to_path_buf(),
            // Nanosecond precision: readers compare metadata to detect a swap.
            recorded_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)),
        }
    }
}

/// Summary row for listing entries.
#[derive(Debug, Clone)]
pub struct EntrySummary {
    pub fingerprint: String,
    pub metadata: EntryMetadata,
}

/// Persistent results keyed by [`fingerprint`]. Entries never expire.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fingerprint(&self, spec: &CommandSpec) -> String {
        fingerprint(spec)
    }

    /// Directory an entry lives in (whether or not it exists yet).
    pub fn entry_dir(&self, fingerprint: &str) -> Result<PathBuf, StoreError> {
        if !is_fingerprint(fingerprint) {
            return Err(StoreError::InvalidFingerprint(fingerprint.to_string()));
        }
        Ok(self.root.join(fingerprint))
    }

    /// An entry exists once its metadata has been renamed into place.
    pub fn exists(&self, fingerprint: &str) -> bool {
        self.entry_dir(fingerprint)
            .map(|dir| dir.join(META_FILE).is_file())
            .unwrap_or(false)
    }

    /// Persist `result`, replacing any previous entry for `fingerprint` wholesale.
    #[instrument(skip_all, fields(fingerprint = %fingerprint))]
    pub fn write(&self, fingerprint: &str, result: &CommandResult) -> Result<(), StoreError> {
        let target = self.entry_dir(fingerprint)?;
        fs::create_dir_all(&self.root).map_err(StoreError::io("create store", &self.root))?;

        let staging = self.root.join(scratch_name(STAGING_PREFIX, fingerprint));
        if let Err(err) = self.stage(&staging, result) {
            remove_quietly(&staging);
            return Err(err);
        }

        if let Err(err) = self.swap_into_place(&staging, &target, fingerprint) {
            remove_quietly(&staging);
            return Err(err);
        }
        debug!(dir = %target.display(), success = result.success(), "stored result");
        Ok(())
    }

    /// Rebuild a stored result without re-executing anything.
    ///
    /// The metadata is read before and after the streams; if a concurrent write
    /// swapped the entry in between, the read starts over. A missing stream
    /// artifact of an otherwise stable entry reads as empty output.
    #[instrument(skip_all, fields(fingerprint = %fingerprint))]
    pub fn read(&self, fingerprint: &str) -> Result<CommandResult, StoreError> {
        let dir = self.entry_dir(fingerprint)?;
        for attempt in 1..=READ_ATTEMPTS {
            let before = self.read_metadata(fingerprint)?;
            let stdout = read_stream(&dir.join(STDOUT_FILE))?;
            let stderr = read_stream(&dir.join(STDERR_FILE))?;
            match self.read_metadata(fingerprint) {
                Ok(after) if after == before => {
                    return Ok(CommandResult::restore(RestoredResult {
                        exit_code: before.exit_code,
                        success: before.success,
                        timed_out: before.timed_out,
                        command: before.command,
                        cwd: before.cwd,
                        stdout,
                        stderr,
                    }));
                }
                Ok(_) | Err(StoreError::NotFound { .. }) => {
                    debug!(attempt, "entry replaced while reading, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(StoreError::Contended {
            fingerprint: fingerprint.to_string(),
        })
    }

    /// Metadata only, without loading the output streams.
    pub fn read_metadata(&self, fingerprint: &str) -> Result<EntryMetadata, StoreError> {
        let path = self.entry_dir(fingerprint)?.join(META_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    fingerprint: fingerprint.to_string(),
                });
            }
            Err(source) => {
                return Err(StoreError::Io {
                    action: "read",
                    path,
                    source,
                });
            }
        };
        serde_json::from_str(&raw).map_err(|source| StoreError::Metadata { path, source })
    }

    /// All readable entries, sorted by fingerprint. Unreadable entries are skipped.
    pub fn list(&self) -> Result<Vec<EntrySummary>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    action: "list",
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StoreError::io("list", &self.root))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_fingerprint(&name) {
                continue;
            }
            match self.read_metadata(&name) {
                Ok(metadata) => summaries.push(EntrySummary {
                    fingerprint: name,
                    metadata,
                }),
                Err(err) => warn!(fingerprint = %name, err = %err, "skipping unreadable entry"),
            }
        }
        summaries.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(summaries)
    }

    /// Remove every entry (and any leftover scratch directories). Returns how many
    /// entries were removed.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(StoreError::Io {
                    action: "list",
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(StoreError::io("list", &self.root))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_scratch = name.starts_with(STAGING_PREFIX) || name.starts_with(TRASH_PREFIX);
            if !is_fingerprint(&name) && !is_scratch {
                continue;
            }
            let path = entry.path();
            fs::remove_dir_all(&path).map_err(StoreError::io("remove", &path))?;
            if !is_scratch {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn stage(&self, staging: &Path, result: &CommandResult) -> Result<(), StoreError> {
        fs::create_dir(staging).map_err(StoreError::io("create staging dir", staging))?;

        let stdout_path = staging.join(STDOUT_FILE);
        fs::write(&stdout_path, result.stdout()).map_err(StoreError::io("write", &stdout_path))?;
        let stderr_path = staging.join(STDERR_FILE);
        fs::write(&stderr_path, result.stderr()).map_err(StoreError::io("write", &stderr_path))?;

        let meta_path = staging.join(META_FILE);
        let mut buf = serde_json::to_string_pretty(&EntryMetadata::from_result(result))
            .map_err(|source| StoreError::Metadata {
                path: meta_path.clone(),
                source,
            })?;
        buf.push('\n');
        fs::write(&meta_path, buf).map_err(StoreError::io("write", &meta_path))
    }

    /// Rename `staging` onto `target`. An existing entry is first moved aside,
    /// since directories cannot be renamed over non-empty ones.
    fn swap_into_place(
        &self,
        staging: &Path,
        target: &Path,
        fingerprint: &str,
    ) -> Result<(), StoreError> {
        // Two tries: a concurrent writer may land its entry between our move-aside
        // and our rename.
        let mut last_err = None;
        for _ in 0..2 {
            if target.exists() {
                let trash = self.root.join(scratch_name(TRASH_PREFIX, fingerprint));
                match fs::rename(target, &trash) {
                    Ok(()) => remove_quietly(&trash),
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(StoreError::Io {
                            action: "move aside",
                            path: target.to_path_buf(),
                            source,
                        });
                    }
                }
            }
            match fs::rename(staging, target) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(err = %err, "rename into place failed, retrying");
                    last_err = Some(err);
                }
            }
        }
        Err(StoreError::Io {
            action: "rename into place",
            path: target.to_path_buf(),
            source: last_err.unwrap_or_else(|| std::io::Error::other("rename failed")),
        })
    }
}

fn read_stream(path: &Path) -> Result<String, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "stream artifact missing, reading as empty");
            Ok(String::new())
        }
        Err(source) => Err(StoreError::Io {
            action: "read",
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn scratch_name(prefix: &str, fingerprint: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{prefix}{fingerprint}-{}-{nanos}", std::process::id())
}

fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path) {
        if err.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), err = %err, "failed to remove scratch directory");
        }
    }
}
