//! Per-phase retry bookkeeping for the fix loop.

use crate::core::types::Phase;

/// Where a phase currently sits in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStatus {
    Ready,
    Running,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

/// Mutable session state for one phase of the retry loop.
///
/// Invariant: `current_attempt <= max_attempts`. Only [`LoopState::begin_attempt`]
/// moves the counter, and it refuses to move past the bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopState {
    current_attempt: u32,
    max_attempts: u32,
    last_error: Option<String>,
    phase: Phase,
    status: PhaseStatus,
    build_succeeded: bool,
    run_succeeded: bool,
}

impl LoopState {
    /// Fresh state for `phase`. A budget of zero is treated as one attempt.
    pub fn new(phase: Phase, max_attempts: u32) -> Self {
        Self {
            current_attempt: 0,
            max_attempts: max_attempts.max(1),
            last_error: None,
            phase,
            status: PhaseStatus::Ready,
            build_succeeded: false,
            run_succeeded: false,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.current_attempt < self.max_attempts
    }

    /// Enter `Running`, incrementing the counter first. Returns the new attempt
    /// number, or `None` when the budget is spent.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if !self.can_retry() {
            return None;
        }
        self.current_attempt += 1;
        self.status = PhaseStatus::Running;
        Some(self.current_attempt)
    }

    pub fn succeed(&mut self) {
        self.status = PhaseStatus::Succeeded;
        match self.phase {
            Phase::Build => self.build_succeeded = true,
            Phase::Run => self.run_succeeded = true,
        }
    }

    /// Record a failed attempt that will be retried.
    pub fn fail_retryable(&mut self, error: String) {
        self.last_error = Some(error);
        self.status = PhaseStatus::FailedRetryable;
    }

    /// Record a failure the loop will not retry. `error` replaces the last
    /// error only when present.
    pub fn fail_terminal(&mut self, error: Option<String>) {
        if error.is_some() {
            self.last_error = error;
        }
        self.status = PhaseStatus::FailedTerminal;
    }

    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> PhaseStatus {
        self.status
    }

    pub fn build_succeeded(&self) -> bool {
        self.build_succeeded
    }

    pub fn run_succeeded(&self) -> bool {
        self.run_succeeded
    }
}
