//! Shared deterministic types for the execution core.
//!
//! These types define stable contracts between the runner, the result store and
//! the fix loop. Once built they are only read, never updated in place.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a [`CommandSpec`] cannot be built.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("command must contain at least one argument")]
    EmptyCommand,
    #[error("resolve working directory {path}: {source}")]
    Cwd {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The unit of work: argv, an absolute working directory and env overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    args: Vec<String>,
    cwd: PathBuf,
    env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Build a spec, resolving `cwd` to an absolute path (without touching symlinks).
    pub fn new(args: Vec<String>, cwd: &Path) -> Result<Self, SpecError> {
        if args.is_empty() {
            return Err(SpecError::EmptyCommand);
        }
        let cwd = std::path::absolute(cwd).map_err(|source| SpecError::Cwd {
            path: cwd.to_path_buf(),
            source,
        })?;
        Ok(Self {
            args,
            cwd,
            env: BTreeMap::new(),
        })
    }

    /// Add one environment override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Same working directory and environment, different argv.
    pub fn with_args(&self, args: Vec<String>) -> Result<Self, SpecError> {
        if args.is_empty() {
            return Err(SpecError::EmptyCommand);
        }
        Ok(Self {
            args,
            cwd: self.cwd.clone(),
            env: self.env.clone(),
        })
    }

    pub fn program(&self) -> &str {
        &self.args[0]
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// The argv rendered as a single shell-escaped string.
    ///
    /// This is the command half of the cache key, so it must stay stable.
    pub fn rendered(&self) -> String {
        shell_words::join(&self.args)
    }
}

/// Outcome of running a [`CommandSpec`] once (or of reading it back from the cache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    exit_code: i32,
    stdout: String,
    stderr: String,
    success: bool,
    timed_out: bool,
    command: String,
    cwd: PathBuf,
}

impl CommandResult {
    /// Result of a process that exited on its own; `success` is derived from `exit_code`.
    pub fn exited(spec: &CommandSpec, exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            success: exit_code == 0,
            timed_out: false,
            command: spec.rendered(),
            cwd: spec.cwd().to_path_buf(),
        }
    }

    /// Result of a process that was killed after exceeding its wall-clock budget.
    pub fn timed_out(spec: &CommandSpec, exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            success: false,
            timed_out: true,
            command: spec.rendered(),
            cwd: spec.cwd().to_path_buf(),
        }
    }

    /// Rebuild a result from persisted fields, trusting the stored `success` flag.
    pub fn restore(record: RestoredResult) -> Self {
        Self {
            exit_code: record.exit_code,
            stdout: record.stdout,
            stderr: record.stderr,
            success: record.success,
            timed_out: record.timed_out,
            command: record.command,
            cwd: record.cwd,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// The stream most likely to explain the outcome.
    ///
    /// Failed runs prefer stderr when it has content; otherwise stdout, falling
    /// back to stderr when stdout is empty.
    pub fn preferred_output(&self) -> &str {
        if !self.success && !self.stderr.is_empty() {
            return &self.stderr;
        }
        if self.stdout.is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Persisted fields used by [`CommandResult::restore`].
#[derive(Debug, Clone)]
pub struct RestoredResult {
    pub exit_code: i32,
    pub success: bool,
    pub timed_out: bool,
    pub command: String,
    pub cwd: PathBuf,
    pub stdout: String,
    pub stderr: String,
}

/// One independently retried segment of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Build,
    Run,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Build => "build",
            Phase::Run => "run",
        }
    }

    /// Guess the phase from an argv: anything mentioning `build` is a build.
    pub fn infer(args: &[String]) -> Self {
        if args.iter().any(|arg| arg == "build") {
            Phase::Build
        } else {
            Phase::Run
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
