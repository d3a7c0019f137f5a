//! Engine scenarios against real processes.
//!
//! Commands run through `ProcessRunner`; only the suggester and the
//! confirmation prompt are scripted.
#![cfg(unix)]

use fixer::core::types::{CommandResult, Phase};
use fixer::engine::{EngineConfig, EngineEvent, FixLoopEngine, PhasePlan, PhaseStop};
use fixer::io::confirm::AutoConfirm;
use fixer::io::runner::ProcessRunner;
use fixer::test_support::{ScriptedConfirmer, ScriptedSuggester, TestWorkspace, file_suggestion};

fn quiet() -> EngineConfig {
    EngineConfig {
        stream_output: false,
        ..EngineConfig::default()
    }
}

#[derive(Debug, Default)]
struct Seen {
    attempts: u32,
    executed: u32,
    cache_hits: u32,
}

fn record(seen: &mut Seen, event: &EngineEvent<'_>) {
    match event {
        EngineEvent::AttemptStarted { .. } => seen.attempts += 1,
        EngineEvent::CacheHit { .. } => seen.cache_hits += 1,
        EngineEvent::CommandFinished {
            from_cache: false, ..
        } => seen.executed += 1,
        _ => {}
    }
}

#[test]
fn failing_command_with_broken_suggester_runs_once() {
    let ws = TestWorkspace::new().expect("workspace");
    let store = ws.store();
    let runner = ProcessRunner::default();
    let suggester = ScriptedSuggester::unavailable();
    let confirmer = ScriptedConfirmer::default();
    let config = quiet();
    let engine = FixLoopEngine::new(&config, &store, &runner, &suggester, &confirmer);
    let spec = ws.spec(&["false"]);

    let mut seen = Seen::default();
    let outcome = engine
        .run_phase(&PhasePlan::new(Phase::Run, spec.clone(), 2), |event| {
            record(&mut seen, event);
        })
        .expect("phase");

    assert_eq!(seen.executed, 1);
    assert_eq!(outcome.attempts(), 1);
    assert!(matches!(outcome.stop, PhaseStop::SuggestionFailed { .. }));
    assert_eq!(suggester.call_count(), 1);
    assert_eq!(confirmer.asked(), 0);

    let stored = store.read(&store.fingerprint(&spec)).expect("stored result");
    assert!(!stored.success());
    assert_eq!(stored.exit_code(), 1);
}

#[test]
fn succeeding_command_never_asks_for_a_fix() {
    let ws = TestWorkspace::new().expect("workspace");
    let store = ws.store();
    let runner = ProcessRunner::default();
    let suggester = ScriptedSuggester::unavailable();
    let confirmer = ScriptedConfirmer::default();
    let config = quiet();
    let engine = FixLoopEngine::new(&config, &store, &runner, &suggester, &confirmer);

    let mut seen = Seen::default();
    let outcome = engine
        .run_phase(&PhasePlan::new(Phase::Run, ws.spec(&["true"]), 3), |event| {
            record(&mut seen, event);
        })
        .expect("phase");

    assert!(outcome.succeeded());
    assert_eq!(seen.attempts, 1);
    assert_eq!(seen.executed, 1);
    assert_eq!(outcome.last_exit_code, Some(0));
    assert!(outcome.state.run_succeeded());
    assert_eq!(suggester.call_count(), 0);
}

#[test]
fn forced_rerun_overwrites_the_stored_entry() {
    let ws = TestWorkspace::new().expect("workspace");
    let store = ws.store();
    let spec = ws.spec(&["sh", "-c", "echo fresh"]);
    let fingerprint = store.fingerprint(&spec);
    let stale = CommandResult::exited(&spec, 1, "stale\n".to_string(), "old error\n".to_string());
    store.write(&fingerprint, &stale).expect("seed store");

    let runner = ProcessRunner::default();
    let suggester = ScriptedSuggester::unavailable();
    let confirmer = ScriptedConfirmer::default();
    let config = EngineConfig {
        force_rerun: true,
        ..quiet()
    };
    let engine = FixLoopEngine::new(&config, &store, &runner, &suggester, &confirmer);

    let mut seen = Seen::default();
    let outcome = engine
        .run_phase(&PhasePlan::new(Phase::Run, spec, 3), |event| {
            record(&mut seen, event);
        })
        .expect("phase");

    assert!(outcome.succeeded());
    assert_eq!(seen.cache_hits, 0);
    assert_eq!(seen.executed, 1);
    let stored = store.read(&fingerprint).expect("stored result");
    assert!(stored.success());
    assert_eq!(stored.stdout(), "fresh\n");
    assert_eq!(stored.stderr(), "");
}

#[test]
fn stored_success_is_reused_without_executing() {
    let ws = TestWorkspace::new().expect("workspace");
    let store = ws.store();
    // Would fail if it actually ran.
    let spec = ws.spec(&["false"]);
    let fingerprint = store.fingerprint(&spec);
    let recorded = CommandResult::exited(&spec, 0, "cached\n".to_string(), String::new());
    store.write(&fingerprint, &recorded).expect("seed store");

    let runner = ProcessRunner::default();
    let suggester = ScriptedSuggester::unavailable();
    let confirmer = ScriptedConfirmer::default();
    let config = quiet();
    let engine = FixLoopEngine::new(&config, &store, &runner, &suggester, &confirmer);

    let mut seen = Seen::default();
    let outcome = engine
        .run_phase(&PhasePlan::new(Phase::Run, spec, 3), |event| {
            record(&mut seen, event);
        })
        .expect("phase");

    assert!(outcome.succeeded());
    assert_eq!(seen.cache_hits, 1);
    assert_eq!(seen.executed, 0);
    assert_eq!(outcome.last_fingerprint.as_deref(), Some(fingerprint.as_str()));
}

#[test]
fn file_fix_makes_the_retry_pass() {
    let ws = TestWorkspace::new().expect("workspace");
    let store = ws.store();
    let runner = ProcessRunner::default();
    let suggester = ScriptedSuggester::new(vec![Ok(file_suggestion("ready.txt", "ok\n"))]);
    let config = quiet();
    let engine = FixLoopEngine::new(&config, &store, &runner, &suggester, &AutoConfirm);

    let mut seen = Seen::default();
    let plan = PhasePlan::new(Phase::Build, ws.spec(&["test", "-f", "ready.txt"]), 3);
    let outcome = engine
        .run_phase(&plan, |event| record(&mut seen, event))
        .expect("phase");

    assert!(outcome.succeeded());
    assert_eq!(outcome.attempts(), 2);
    assert_eq!(seen.executed, 2);
    assert!(outcome.state.build_succeeded());
    assert_eq!(
        std::fs::read_to_string(ws.path("ready.txt")).expect("read fix"),
        "ok\n"
    );
    let request = &suggester.requests()[0];
    assert_eq!(request.prior_attempts, 0);
    assert_eq!(request.phase, Phase::Build);
}

#[test]
fn budget_bounds_real_executions() {
    let ws = TestWorkspace::new().expect("workspace");
    let store = ws.store();
    let runner = ProcessRunner::default();
    // Each fix rewrites an unrelated file, so the command keeps failing.
    let suggester = ScriptedSuggester::new(vec![
        Ok(file_suggestion("notes.txt", "one")),
        Ok(file_suggestion("notes.txt", "two")),
        Ok(file_suggestion("notes.txt", "three")),
    ]);
    let config = quiet();
    let engine = FixLoopEngine::new(&config, &store, &runner, &suggester, &AutoConfirm);

    let mut seen = Seen::default();
    let outcome = engine
        .run_phase(&PhasePlan::new(Phase::Run, ws.spec(&["false"]), 2), |event| {
            record(&mut seen, event);
        })
        .expect("phase");

    assert_eq!(outcome.stop, PhaseStop::Exhausted);
    assert_eq!(seen.attempts, 2);
    assert_eq!(seen.executed, 2);
    assert!(!outcome.state.can_retry());
    assert_eq!(suggester.call_count(), 1);
}
