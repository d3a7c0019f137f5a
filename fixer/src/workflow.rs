//! Multi-phase driver: run phases in order, each with its own budget.

use tracing::{info, instrument};

use crate::engine::{EngineError, EngineEvent, FixLoopEngine, PhaseOutcome, PhasePlan};
use crate::io::confirm::Confirmer;
use crate::io::runner::CommandRunner;
use crate::io::suggest::Suggester;

/// Result of a workflow: the outcomes of the phases that ran.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub phases: Vec<PhaseOutcome>,
    /// True when every planned phase succeeded.
    pub succeeded: bool,
}

impl WorkflowOutcome {
    /// The phase that ended the workflow without success, if any.
    pub fn failed_phase(&self) -> Option<&PhaseOutcome> {
        self.phases.iter().find(|phase| !phase.succeeded())
    }
}

/// Run `plans` in order. A phase starts only after the previous one succeeded.
///
/// Skipping a phase is done by leaving it out of `plans`.
#[instrument(skip_all, fields(phases = plans.len()))]
pub fn run_phases<R, S, C, F>(
    engine: &FixLoopEngine<'_, R, S, C>,
    plans: &[PhasePlan],
    mut on_event: F,
) -> Result<WorkflowOutcome, EngineError>
where
    R: CommandRunner,
    S: Suggester,
    C: Confirmer,
    F: FnMut(&EngineEvent<'_>),
{
    let mut phases = Vec::with_capacity(plans.len());
    for plan in plans {
        let outcome = engine.run_phase(plan, &mut on_event)?;
        let succeeded = outcome.succeeded();
        phases.push(outcome);
        if !succeeded {
            info!(phase = %plan.phase, "phase did not succeed, stopping workflow");
            return Ok(WorkflowOutcome {
                phases,
                succeeded: false,
            });
        }
    }
    Ok(WorkflowOutcome {
        phases,
        succeeded: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Phase;
    use crate::engine::{EngineConfig, PhaseStop};
    use crate::test_support::{
        ScriptedConfirmer, ScriptedRun, ScriptedRunner, ScriptedSuggester, TestWorkspace,
    };

    #[test]
    fn empty_plan_list_succeeds() {
        let ws = TestWorkspace::new().expect("workspace");
        let store = ws.store();
        let runner = ScriptedRunner::default();
        let suggester = ScriptedSuggester::unavailable();
        let confirmer = ScriptedConfirmer::default();
        let config = EngineConfig::default();
        let engine = FixLoopEngine::new(&config, &store, &runner, &suggester, &confirmer);

        let outcome = run_phases(&engine, &[], |_| {}).expect("workflow");
        assert!(outcome.succeeded);
        assert!(outcome.phases.is_empty());
        assert!(outcome.failed_phase().is_none());
    }

    #[test]
    fn failed_first_phase_skips_the_second() {
        let ws = TestWorkspace::new().expect("workspace");
        let store = ws.store();
        let runner = ScriptedRunner::new(vec![ScriptedRun::fail(1, "build broke")]);
        let suggester = ScriptedSuggester::unavailable();
        let confirmer = ScriptedConfirmer::default();
        let config = EngineConfig::default();
        let engine = FixLoopEngine::new(&config, &store, &runner, &suggester, &confirmer);
        let plans = [
            PhasePlan::new(Phase::Build, ws.spec(&["docker", "build", "."]), 2),
            PhasePlan::new(Phase::Run, ws.spec(&["docker", "run", "app"]), 2),
        ];

        let outcome = run_phases(&engine, &plans, |_| {}).expect("workflow");

        assert!(!outcome.succeeded);
        assert_eq!(outcome.phases.len(), 1);
        assert_eq!(runner.call_count(), 1);
        let failed = outcome.failed_phase().expect("failed phase");
        assert_eq!(failed.state.phase(), Phase::Build);
        assert!(matches!(failed.stop, PhaseStop::SuggestionFailed { .. }));
    }

    #[test]
    fn phases_run_in_order_with_independent_budgets() {
        let ws = TestWorkspace::new().expect("workspace");
        let store = ws.store();
        let runner = ScriptedRunner::new(vec![ScriptedRun::ok("built"), ScriptedRun::ok("ran")]);
        let suggester = ScriptedSuggester::unavailable();
        let confirmer = ScriptedConfirmer::default();
        let config = EngineConfig::default();
        let engine = FixLoopEngine::new(&config, &store, &runner, &suggester, &confirmer);
        let plans = [
            PhasePlan::new(Phase::Build, ws.spec(&["docker", "build", "."]), 1),
            PhasePlan::new(Phase::Run, ws.spec(&["docker", "run", "app"]), 4),
        ];

        let mut finished = Vec::new();
        let outcome = run_phases(&engine, &plans, |event| {
            if let EngineEvent::PhaseFinished { outcome } = event {
                finished.push(outcome.state.phase());
            }
        })
        .expect("workflow");

        assert!(outcome.succeeded);
        assert_eq!(finished, vec![Phase::Build, Phase::Run]);
        assert_eq!(outcome.phases[0].state.max_attempts(), 1);
        assert_eq!(outcome.phases[1].state.max_attempts(), 4);
        assert!(outcome.phases[0].state.build_succeeded());
        assert!(outcome.phases[1].state.run_succeeded());
        let calls = runner.calls();
        assert_eq!(calls[0].args()[1], "build");
        assert_eq!(calls[1].args()[1], "run");
    }
}
