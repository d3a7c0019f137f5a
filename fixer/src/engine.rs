//! The fix loop for a single phase.
//!
//! Each attempt resolves a [`CommandResult`] (from the store on the first attempt,
//! otherwise by running the command), persists it, and on failure asks the
//! [`Suggester`] for a fix. A fix that is confirmed and applied earns another
//! attempt. Everything else ends the phase.

use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::error_context::error_context;
use crate::core::loop_state::LoopState;
use crate::core::suggestion::FixSuggestion;
use crate::core::types::{CommandResult, CommandSpec, Phase, SpecError};
use crate::io::apply::{AppliedFix, ApplyError, apply_suggestion};
use crate::io::attempt_log::{AttemptLog, AttemptMeta};
use crate::io::confirm::Confirmer;
use crate::io::process::LaunchError;
use crate::io::result_store::{ResultStore, StoreError};
use crate::io::runner::CommandRunner;
use crate::io::suggest::{SuggestRequest, Suggester};

/// Faults that halt a phase immediately. A failing command is not one of them.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("launch failed: {0}")]
    Launch(#[from] LaunchError),
    #[error("result store failed: {0}")]
    Store(#[from] StoreError),
    #[error("applying fix failed: {0}")]
    Apply(#[from] ApplyError),
    #[error("replacement command rejected: {0}")]
    Spec(#[from] SpecError),
    #[error("confirmation failed: {0:#}")]
    Confirm(anyhow::Error),
}

/// Engine switches, resolved once from config and flags.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ignore stored results and always execute.
    pub force_rerun: bool,
    /// When false, the first failure ends the phase without asking for a fix.
    pub fix_enabled: bool,
    pub error_context_limit_bytes: usize,
    /// Forward command stdout to the console while it runs.
    pub stream_output: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            force_rerun: false,
            fix_enabled: true,
            error_context_limit_bytes: 20_000,
            stream_output: true,
        }
    }
}

/// One phase to drive: what to run and how many attempts it gets.
#[derive(Debug, Clone)]
pub struct PhasePlan {
    pub phase: Phase,
    pub spec: CommandSpec,
    pub max_attempts: u32,
    /// Files handed to the suggester as context, relative to the command's cwd.
    pub context_files: Vec<PathBuf>,
}

impl PhasePlan {
    pub fn new(phase: Phase, spec: CommandSpec, max_attempts: u32) -> Self {
        Self {
            phase,
            spec,
            max_attempts,
            context_files: Vec::new(),
        }
    }

    pub fn with_context_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.context_files.push(path.into());
        self
    }
}

/// Why a phase stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseStop {
    Succeeded,
    /// The last permitted attempt failed.
    Exhausted,
    /// The command failed and fixing was switched off.
    FixDisabled,
    /// The suggester could not produce a usable suggestion.
    SuggestionFailed { message: String },
    /// The operator rejected the suggestion.
    Declined,
}

impl PhaseStop {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStop::Succeeded => "succeeded",
            PhaseStop::Exhausted => "exhausted",
            PhaseStop::FixDisabled => "fix_disabled",
            PhaseStop::SuggestionFailed { .. } => "suggestion_failed",
            PhaseStop::Declined => "declined",
        }
    }
}

/// Summary of one phase.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub state: LoopState,
    pub stop: PhaseStop,
    /// Command of the final attempt (differs from the plan after a command fix).
    pub final_spec: CommandSpec,
    pub last_fingerprint: Option<String>,
    pub last_exit_code: Option<i32>,
}

impl PhaseOutcome {
    pub fn succeeded(&self) -> bool {
        self.stop == PhaseStop::Succeeded
    }

    pub fn attempts(&self) -> u32 {
        self.state.current_attempt()
    }
}

/// Progress notifications for the caller's display.
#[derive(Debug)]
pub enum EngineEvent<'a> {
    AttemptStarted {
        phase: Phase,
        attempt: u32,
        max_attempts: u32,
        command: &'a str,
    },
    CacheHit {
        fingerprint: &'a str,
        success: bool,
    },
    CommandFinished {
        result: &'a CommandResult,
        fingerprint: &'a str,
        from_cache: bool,
    },
    Suggesting {
        phase: Phase,
    },
    Suggested {
        suggestion: &'a FixSuggestion,
    },
    FixApplied {
        fix: &'a AppliedFix,
    },
    PhaseFinished {
        outcome: &'a PhaseOutcome,
    },
}

/// Drives phases through run, evaluate, suggest, apply.
pub struct FixLoopEngine<'a, R, S, C> {
    config: &'a EngineConfig,
    store: &'a ResultStore,
    runner: &'a R,
    suggester: &'a S,
    confirmer: &'a C,
    attempt_log: Option<&'a AttemptLog>,
}

impl<'a, R: CommandRunner, S: Suggester, C: Confirmer> FixLoopEngine<'a, R, S, C> {
    pub fn new(
        config: &'a EngineConfig,
        store: &'a ResultStore,
        runner: &'a R,
        suggester: &'a S,
        confirmer: &'a C,
    ) -> Self {
        Self {
            config,
            store,
            runner,
            suggester,
            confirmer,
            attempt_log: None,
        }
    }

    pub fn with_attempt_log(mut self, log: &'a AttemptLog) -> Self {
        self.attempt_log = Some(log);
        self
    }

    /// Run one phase to a terminal state with a fresh [`LoopState`].
    ///
    /// `Ok` covers every way the loop can end, including command failure.
    /// `Err` is reserved for launch, store, apply and confirmation faults.
    #[instrument(skip_all, fields(phase = %plan.phase, max_attempts = plan.max_attempts))]
    pub fn run_phase<F: FnMut(&EngineEvent<'_>)>(
        &self,
        plan: &PhasePlan,
        mut on_event: F,
    ) -> Result<PhaseOutcome, EngineError> {
        let mut state = LoopState::new(plan.phase, plan.max_attempts);
        let mut spec = plan.spec.clone();
        let mut last_fingerprint = None;
        let mut last_exit_code = None;

        let stop = loop {
            let Some(attempt) = state.begin_attempt() else {
                state.fail_terminal(None);
                break PhaseStop::Exhausted;
            };
            let started_at = timestamp();
            let command = spec.rendered();
            info!(attempt, command = %command, "starting attempt");
            on_event(&EngineEvent::AttemptStarted {
                phase: plan.phase,
                attempt,
                max_attempts: state.max_attempts(),
                command: &command,
            });

            let fingerprint = self.store.fingerprint(&spec);
            let (result, from_cache) = self.resolve(&spec, &fingerprint, attempt, &mut on_event)?;
            on_event(&EngineEvent::CommandFinished {
                result: &result,
                fingerprint: &fingerprint,
                from_cache,
            });
            last_fingerprint = Some(fingerprint.clone());
            last_exit_code = Some(result.exit_code());

            if result.success() {
                state.succeed();
                break PhaseStop::Succeeded;
            }

            let error = error_context(&result, self.config.error_context_limit_bytes);
            if !self.config.fix_enabled {
                state.fail_terminal(Some(error));
                break PhaseStop::FixDisabled;
            }
            if !state.can_retry() {
                state.fail_terminal(Some(error));
                break PhaseStop::Exhausted;
            }

            let record = AttemptRecord {
                phase: plan.phase,
                attempt,
                fingerprint: &fingerprint,
                result: &result,
                from_cache,
                started_at: &started_at,
            };
            let request = SuggestRequest {
                error_context: error.clone(),
                cwd: spec.cwd().to_path_buf(),
                prior_attempts: attempt - 1,
                phase: plan.phase,
                command,
                context_files: plan.context_files.clone(),
            };
            on_event(&EngineEvent::Suggesting { phase: plan.phase });
            let suggestion = match self.suggester.suggest(&request) {
                Ok(suggestion) => suggestion,
                Err(err) => {
                    warn!(err = %err, "suggestion failed");
                    let message = err.to_string();
                    self.log_attempt(&record, "suggestion_failed", Some(&message), None);
                    state.fail_terminal(Some(error));
                    break PhaseStop::SuggestionFailed { message };
                }
            };
            on_event(&EngineEvent::Suggested {
                suggestion: &suggestion,
            });

            if !self
                .confirmer
                .confirm(&suggestion)
                .map_err(EngineError::Confirm)?
            {
                info!("suggestion declined");
                self.log_attempt(&record, "declined", None, Some(&suggestion));
                state.fail_terminal(Some(error));
                break PhaseStop::Declined;
            }

            let applied = match apply_suggestion(&suggestion, spec.cwd()) {
                Ok(applied) => applied,
                Err(err) => {
                    let message = err.to_string();
                    self.log_attempt(&record, "apply_failed", Some(&message), Some(&suggestion));
                    return Err(err.into());
                }
            };
            if let AppliedFix::Command { args } = &applied {
                spec = spec.with_args(args.clone())?;
            }
            on_event(&EngineEvent::FixApplied { fix: &applied });
            self.log_attempt(&record, "fix_applied", None, Some(&suggestion));
            state.fail_retryable(error);
        };

        info!(stop = stop.as_str(), attempts = state.current_attempt(), "phase finished");
        let outcome = PhaseOutcome {
            state,
            stop,
            final_spec: spec,
            last_fingerprint,
            last_exit_code,
        };
        on_event(&EngineEvent::PhaseFinished { outcome: &outcome });
        Ok(outcome)
    }

    /// Stored result for the first attempt when allowed and present; otherwise
    /// a fresh run, persisted before it is returned.
    fn resolve<F: FnMut(&EngineEvent<'_>)>(
        &self,
        spec: &CommandSpec,
        fingerprint: &str,
        attempt: u32,
        on_event: &mut F,
    ) -> Result<(CommandResult, bool), EngineError> {
        let cache_allowed = !self.config.force_rerun && attempt == 1;
        if cache_allowed && self.store.exists(fingerprint) {
            let cached = self.store.read(fingerprint)?;
            if cached.command() == spec.rendered() && cached.cwd() == spec.cwd() {
                debug!(fingerprint, success = cached.success(), "reusing stored result");
                on_event(&EngineEvent::CacheHit {
                    fingerprint,
                    success: cached.success(),
                });
                return Ok((cached, true));
            }
            warn!(fingerprint, "stored entry belongs to another command, re-running");
        }

        let result = self.runner.run(spec, self.config.stream_output)?;
        self.store.write(fingerprint, &result)?;
        Ok((result, false))
    }

    fn log_attempt(
        &self,
        record: &AttemptRecord<'_>,
        outcome: &str,
        error: Option<&str>,
        suggestion: Option<&FixSuggestion>,
    ) {
        let Some(log) = self.attempt_log else {
            return;
        };
        let meta = AttemptMeta {
            session: log.session().to_string(),
            phase: record.phase,
            attempt: record.attempt,
            fingerprint: record.fingerprint.to_string(),
            command: record.result.command().to_string(),
            exit_code: record.result.exit_code(),
            timed_out: record.result.is_timed_out(),
            from_cache: record.from_cache,
            outcome: outcome.to_string(),
            error: error.map(str::to_string),
            started_at: record.started_at.to_string(),
            ended_at: timestamp(),
        };
        if let Err(err) = log.write(&meta, suggestion) {
            warn!(err = %format!("{err:#}"), "failed to write attempt log");
        }
    }
}

struct AttemptRecord<'r> {
    phase: Phase,
    attempt: u32,
    fingerprint: &'r str,
    result: &'r CommandResult,
    from_cache: bool,
    started_at: &'r str,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loop_state::PhaseStatus;
    use crate::io::suggest::SuggestionError;
    use crate::test_support::{
        ScriptedConfirmer, ScriptedRun, ScriptedRunner, ScriptedSuggester, TestWorkspace,
        command_suggestion, file_suggestion,
    };
    use std::fs;

    fn run(
        ws: &TestWorkspace,
        config: &EngineConfig,
        runner: &ScriptedRunner,
        suggester: &ScriptedSuggester,
        confirmer: &ScriptedConfirmer,
        plan: &PhasePlan,
    ) -> (PhaseOutcome, Vec<String>) {
        let store = ws.store();
        let engine = FixLoopEngine::new(config, &store, runner, suggester, confirmer);
        let mut events = Vec::new();
        let outcome = engine
            .run_phase(plan, |event| events.push(event_name(event)))
            .expect("run phase");
        (outcome, events)
    }

    fn event_name(event: &EngineEvent<'_>) -> String {
        match event {
            EngineEvent::AttemptStarted { attempt, .. } => format!("attempt:{attempt}"),
            EngineEvent::CacheHit { .. } => "cache_hit".to_string(),
            EngineEvent::CommandFinished { result, .. } => format!("exit:{}", result.exit_code()),
            EngineEvent::Suggesting { .. } => "suggesting".to_string(),
            EngineEvent::Suggested { .. } => "suggested".to_string(),
            EngineEvent::FixApplied { .. } => "applied".to_string(),
            EngineEvent::PhaseFinished { outcome } => {
                format!("finished:{}", outcome.stop.as_str())
            }
        }
    }

    #[test]
    fn success_on_first_attempt_skips_suggestion() {
        let ws = TestWorkspace::new().expect("workspace");
        let runner = ScriptedRunner::new(vec![ScriptedRun::ok("built\n")]);
        let suggester = ScriptedSuggester::unavailable();
        let confirmer = ScriptedConfirmer::default();
        let plan = PhasePlan::new(Phase::Build, ws.spec(&["make"]), 3);

        let (outcome, events) = run(
            &ws,
            &EngineConfig::default(),
            &runner,
            &suggester,
            &confirmer,
            &plan,
        );

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts(), 1);
        assert!(outcome.state.build_succeeded());
        assert_eq!(suggester.call_count(), 0);
        assert_eq!(events, vec!["attempt:1", "exit:0", "finished:succeeded"]);
    }

    #[test]
    fn applied_fix_earns_another_attempt() {
        let ws = TestWorkspace::new().expect("workspace");
        fs::write(ws.path("Dockerfile"), "FROM ubuntu\n").expect("seed");
        let runner = ScriptedRunner::new(vec![
            ScriptedRun::fail(1, "E: Unable to locate package"),
            ScriptedRun::ok("done"),
        ]);
        let suggester =
            ScriptedSuggester::new(vec![Ok(file_suggestion("Dockerfile", "FROM debian\n"))]);
        let confirmer = ScriptedConfirmer::new(vec![true]);
        let plan = PhasePlan::new(Phase::Build, ws.spec(&["docker", "build", "."]), 3)
            .with_context_file("Dockerfile");

        let (outcome, events) = run(
            &ws,
            &EngineConfig::default(),
            &runner,
            &suggester,
            &confirmer,
            &plan,
        );

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(runner.call_count(), 2);
        assert_eq!(
            fs::read_to_string(ws.path("Dockerfile")).expect("dockerfile"),
            "FROM debian\n"
        );
        assert_eq!(
            fs::read_to_string(ws.path("Dockerfile.backup")).expect("backup"),
            "FROM ubuntu\n"
        );
        let request = &suggester.requests()[0];
        assert_eq!(request.prior_attempts, 0);
        assert_eq!(request.error_context, "E: Unable to locate package");
        assert_eq!(request.context_files, vec![PathBuf::from("Dockerfile")]);
        assert_eq!(
            events,
            vec![
                "attempt:1",
                "exit:1",
                "suggesting",
                "suggested",
                "applied",
                "attempt:2",
                "exit:0",
                "finished:succeeded",
            ]
        );
    }

    #[test]
    fn attempts_never_exceed_the_budget() {
        let ws = TestWorkspace::new().expect("workspace");
        let runner = ScriptedRunner::new(vec![
            ScriptedRun::fail(1, "one"),
            ScriptedRun::fail(1, "two"),
            ScriptedRun::fail(1, "three"),
        ]);
        let suggester = ScriptedSuggester::new(vec![
            Ok(file_suggestion("a.txt", "a")),
            Ok(file_suggestion("b.txt", "b")),
        ]);
        let confirmer = ScriptedConfirmer::new(vec![true, true]);
        let plan = PhasePlan::new(Phase::Run, ws.spec(&["./app"]), 3);

        let (outcome, _) = run(
            &ws,
            &EngineConfig::default(),
            &runner,
            &suggester,
            &confirmer,
            &plan,
        );

        assert_eq!(outcome.stop, PhaseStop::Exhausted);
        assert_eq!(runner.call_count(), 3);
        assert_eq!(suggester.call_count(), 2);
        assert_eq!(outcome.state.current_attempt(), outcome.state.max_attempts());
        assert!(!outcome.state.can_retry());
        assert_eq!(outcome.state.status(), PhaseStatus::FailedTerminal);
        assert_eq!(outcome.state.last_error(), Some("three"));
    }

    #[test]
    fn suggestion_failure_stops_without_another_run() {
        let ws = TestWorkspace::new().expect("workspace");
        let runner = ScriptedRunner::new(vec![ScriptedRun::fail(1, "boom")]);
        let suggester = ScriptedSuggester::new(vec![Err(SuggestionError::InvalidResponse(
            "garbage".to_string(),
        ))]);
        let confirmer = ScriptedConfirmer::default();
        let plan = PhasePlan::new(Phase::Build, ws.spec(&["make"]), 5);

        let (outcome, _) = run(
            &ws,
            &EngineConfig::default(),
            &runner,
            &suggester,
            &confirmer,
            &plan,
        );

        assert!(matches!(
            outcome.stop,
            PhaseStop::SuggestionFailed { ref message } if message.contains("garbage")
        ));
        assert_eq!(runner.call_count(), 1);
        assert_eq!(confirmer.asked(), 0);
    }

    #[test]
    fn declined_suggestion_stops_without_another_run() {
        let ws = TestWorkspace::new().expect("workspace");
        let runner = ScriptedRunner::new(vec![ScriptedRun::fail(2, "boom")]);
        let suggester = ScriptedSuggester::new(vec![Ok(file_suggestion("x.txt", "x"))]);
        let confirmer = ScriptedConfirmer::new(vec![false]);
        let plan = PhasePlan::new(Phase::Build, ws.spec(&["make"]), 3);

        let (outcome, _) = run(
            &ws,
            &EngineConfig::default(),
            &runner,
            &suggester,
            &confirmer,
            &plan,
        );

        assert_eq!(outcome.stop, PhaseStop::Declined);
        assert_eq!(runner.call_count(), 1);
        assert!(!ws.path("x.txt").exists());
    }

    #[test]
    fn fix_disabled_stops_after_first_failure() {
        let ws = TestWorkspace::new().expect("workspace");
        let runner = ScriptedRunner::new(vec![ScriptedRun::fail(1, "boom")]);
        let suggester = ScriptedSuggester::unavailable();
        let confirmer = ScriptedConfirmer::default();
        let config = EngineConfig {
            fix_enabled: false,
            ..EngineConfig::default()
        };
        let plan = PhasePlan::new(Phase::Run, ws.spec(&["make"]), 3);

        let (outcome, _) = run(&ws, &config, &runner, &suggester, &confirmer, &plan);

        assert_eq!(outcome.stop, PhaseStop::FixDisabled);
        assert_eq!(suggester.call_count(), 0);
        assert_eq!(outcome.last_exit_code, Some(1));
    }

    #[test]
    fn command_fix_replaces_the_retried_command() {
        let ws = TestWorkspace::new().expect("workspace");
        let runner = ScriptedRunner::new(vec![
            ScriptedRun::fail(127, "make: not found"),
            ScriptedRun::ok(""),
        ]);
        let suggester =
            ScriptedSuggester::new(vec![Ok(command_suggestion("cargo build --release"))]);
        let confirmer = ScriptedConfirmer::new(vec![true]);
        let plan = PhasePlan::new(Phase::Build, ws.spec(&["make"]), 2);

        let (outcome, _) = run(
            &ws,
            &EngineConfig::default(),
            &runner,
            &suggester,
            &confirmer,
            &plan,
        );

        assert!(outcome.succeeded());
        let calls = runner.calls();
        assert_eq!(calls[1].args(), ["cargo", "build", "--release"]);
        assert_eq!(calls[1].cwd(), calls[0].cwd());
        assert_eq!(outcome.final_spec.rendered(), "cargo build --release");
        assert_ne!(
            outcome.last_fingerprint.as_deref(),
            Some(fingerprint_of(&ws, &calls[0]).as_str())
        );
    }

    fn fingerprint_of(ws: &TestWorkspace, spec: &CommandSpec) -> String {
        ws.store().fingerprint(spec)
    }

    #[test]
    fn stored_result_is_reused_and_its_success_flag_trusted() {
        let ws = TestWorkspace::new().expect("workspace");
        let spec = ws.spec(&["make"]);
        let store = ws.store();
        let fp = store.fingerprint(&spec);
        store
            .write(&fp, &CommandResult::exited(&spec, 0, "cached".into(), String::new()))
            .expect("seed");

        let runner = ScriptedRunner::new(Vec::new());
        let suggester = ScriptedSuggester::unavailable();
        let confirmer = ScriptedConfirmer::default();
        let plan = PhasePlan::new(Phase::Build, spec, 3);

        let (outcome, events) = run(
            &ws,
            &EngineConfig::default(),
            &runner,
            &suggester,
            &confirmer,
            &plan,
        );

        assert!(outcome.succeeded());
        assert_eq!(runner.call_count(), 0);
        assert_eq!(events, vec!["attempt:1", "cache_hit", "exit:0", "finished:succeeded"]);
    }

    #[test]
    fn stored_failure_is_only_reused_on_the_first_attempt() {
        let ws = TestWorkspace::new().expect("workspace");
        let spec = ws.spec(&["make"]);
        let store = ws.store();
        let fp = store.fingerprint(&spec);
        store
            .write(&fp, &CommandResult::exited(&spec, 1, String::new(), "old".into()))
            .expect("seed");

        let runner = ScriptedRunner::new(vec![ScriptedRun::ok("fresh")]);
        let suggester = ScriptedSuggester::new(vec![Ok(file_suggestion("f.txt", "f"))]);
        let confirmer = ScriptedConfirmer::new(vec![true]);
        let plan = PhasePlan::new(Phase::Build, spec, 2);

        let (outcome, _) = run(
            &ws,
            &EngineConfig::default(),
            &runner,
            &suggester,
            &confirmer,
            &plan,
        );

        assert!(outcome.succeeded());
        assert_eq!(runner.call_count(), 1);
        assert_eq!(suggester.requests()[0].error_context, "old");
        assert!(store.read(&fp).expect("read").success());
    }

    #[test]
    fn launch_error_halts_the_phase() {
        let ws = TestWorkspace::new().expect("workspace");
        let store = ws.store();
        let runner = ScriptedRunner::new(vec![ScriptedRun::NotFound]);
        let suggester = ScriptedSuggester::unavailable();
        let confirmer = ScriptedConfirmer::default();
        let config = EngineConfig::default();
        let engine = FixLoopEngine::new(&config, &store, &runner, &suggester, &confirmer);

        let err = engine
            .run_phase(&PhasePlan::new(Phase::Run, ws.spec(&["nope"]), 3), |_| {})
            .unwrap_err();

        assert!(matches!(err, EngineError::Launch(LaunchError::NotFound { .. })));
        assert_eq!(suggester.call_count(), 0);
    }

    #[test]
    fn attempt_log_records_suggestion_steps() {
        let ws = TestWorkspace::new().expect("workspace");
        let store = ws.store();
        let log = AttemptLog::with_session(&ws.cache_dir().join("attempts"), "s".to_string());
        let runner =
            ScriptedRunner::new(vec![ScriptedRun::fail(1, "x"), ScriptedRun::fail(1, "y")]);
        let suggester = ScriptedSuggester::new(vec![Ok(file_suggestion("a", "a"))]);
        let confirmer = ScriptedConfirmer::new(vec![true]);
        let config = EngineConfig::default();
        let engine = FixLoopEngine::new(&config, &store, &runner, &suggester, &confirmer)
            .with_attempt_log(&log);

        let outcome = engine
            .run_phase(&PhasePlan::new(Phase::Build, ws.spec(&["make"]), 2), |_| {})
            .expect("run");

        assert_eq!(outcome.stop, PhaseStop::Exhausted);
        assert!(log.dir().join("build-1/meta.json").is_file());
        assert!(log.dir().join("build-1/suggestion.json").is_file());
        // The final attempt never reaches the suggestion step.
        assert!(!log.dir().join("build-2").exists());
    }
}
