//! Scripted collaborators and scratch workspaces for fix-loop tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

use crate::core::suggestion::{FixKind, FixSuggestion};
use crate::core::types::{CommandResult, CommandSpec};
use crate::io::confirm::Confirmer;
use crate::io::process::LaunchError;
use crate::io::result_store::ResultStore;
use crate::io::runner::CommandRunner;
use crate::io::suggest::{SuggestRequest, Suggester, SuggestionError};

/// One canned runner outcome.
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    NotFound,
}

impl ScriptedRun {
    pub fn ok(stdout: &str) -> Self {
        ScriptedRun::Exit {
            code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn fail(code: i32, stderr: &str) -> Self {
        ScriptedRun::Exit {
            code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

/// Runner that replays [`ScriptedRun`]s in order and records every spec it saw.
///
/// Panics when asked to run more often than scripted.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    runs: RefCell<VecDeque<ScriptedRun>>,
    calls: RefCell<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: RefCell::new(runs.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec, _stream: bool) -> Result<CommandResult, LaunchError> {
        self.calls.borrow_mut().push(spec.clone());
        let next = self
            .runs
            .borrow_mut()
            .pop_front()
            .expect("scripted runner exhausted");
        match next {
            ScriptedRun::Exit {
                code,
                stdout,
                stderr,
            } => Ok(CommandResult::exited(spec, code, stdout, stderr)),
            ScriptedRun::NotFound => Err(LaunchError::NotFound {
                program: spec.program().to_string(),
            }),
        }
    }
}

/// Suggester that replays canned outcomes and records the requests it received.
#[derive(Debug, Default)]
pub struct ScriptedSuggester {
    outcomes: RefCell<VecDeque<Result<FixSuggestion, SuggestionError>>>,
    requests: RefCell<Vec<SuggestRequest>>,
}

impl ScriptedSuggester {
    pub fn new(outcomes: Vec<Result<FixSuggestion, SuggestionError>>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// A suggester whose service is always down.
    pub fn unavailable() -> Self {
        Self::new(Vec::new())
    }

    pub fn requests(&self) -> Vec<SuggestRequest> {
        self.requests.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl Suggester for ScriptedSuggester {
    fn suggest(&self, request: &SuggestRequest) -> Result<FixSuggestion, SuggestionError> {
        self.requests.borrow_mut().push(request.clone());
        self.outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(SuggestionError::Unavailable("scripted outage".to_string())))
    }
}

/// Confirmer that replays answers; once they run out it declines.
#[derive(Debug, Default)]
pub struct ScriptedConfirmer {
    answers: RefCell<VecDeque<bool>>,
    asked: Cell<usize>,
}

impl ScriptedConfirmer {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            asked: Cell::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.get()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&self, _suggestion: &FixSuggestion) -> Result<bool> {
        self.asked.set(self.asked.get() + 1);
        Ok(self.answers.borrow_mut().pop_front().unwrap_or(false))
    }
}

/// Temporary project directory with a result store beside it.
pub struct TestWorkspace {
    temp: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        std::fs::create_dir_all(temp.path().join("project"))?;
        Ok(Self { temp })
    }

    /// Working directory for commands.
    pub fn project(&self) -> PathBuf {
        self.temp.path().join("project")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.temp.path().join("cache")
    }

    pub fn store(&self) -> ResultStore {
        ResultStore::new(self.cache_dir().join("results"))
    }

    pub fn spec(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new(args.iter().map(|s| s.to_string()).collect(), &self.project())
            .expect("test spec")
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.project().join(relative)
    }
}

pub fn file_suggestion(path: &str, content: &str) -> FixSuggestion {
    FixSuggestion {
        kind: FixKind::File {
            path: PathBuf::from(path),
            content: content.to_string(),
            explanation: None,
        },
        reason: format!("{path} is wrong"),
        changes_summary: format!("rewrite {path}"),
        confidence: 0.8,
    }
}

pub fn command_suggestion(command: &str) -> FixSuggestion {
    FixSuggestion {
        kind: FixKind::Command {
            command: command.to_string(),
            explanation: None,
        },
        reason: "wrong command".to_string(),
        changes_summary: format!("run `{command}` instead"),
        confidence: 0.6,
    }
}
