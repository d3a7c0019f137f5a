//! User-facing progress text built from engine events.
//!
//! Rendering is kept separate from printing so the wording can be tested.

use crate::core::suggestion::{FixKind, FixSuggestion};
use crate::engine::{EngineEvent, PhaseOutcome, PhaseStop};
use crate::io::apply::AppliedFix;
use crate::workflow::WorkflowOutcome;

/// Text for one event, or `None` for events that print nothing.
pub fn render_event(event: &EngineEvent<'_>) -> Option<String> {
    match event {
        EngineEvent::AttemptStarted {
            phase,
            attempt,
            max_attempts,
            command,
        } => Some(format!(
            "==> [{phase}] attempt {attempt}/{max_attempts}: {command}"
        )),
        EngineEvent::CacheHit {
            fingerprint,
            success,
        } => Some(format!(
            "    using stored result {fingerprint} ({})",
            if *success { "succeeded" } else { "failed" }
        )),
        EngineEvent::CommandFinished {
            result, from_cache, ..
        } => {
            if result.success() {
                Some("    command succeeded".to_string())
            } else if result.is_timed_out() {
                Some("    command timed out".to_string())
            } else {
                let mut text = format!("    command failed with exit code {}", result.exit_code());
                // Streamed runs already showed stdout; stderr and cached output were not shown.
                let shown = if *from_cache {
                    result.preferred_output()
                } else {
                    result.stderr()
                };
                let tail = last_lines(shown, 20);
                if !tail.is_empty() {
                    text.push('\n');
                    text.push_str(&tail);
                }
                Some(text)
            }
        }
        EngineEvent::Suggesting { phase } => Some(format!("    analyzing {phase} failure...")),
        EngineEvent::Suggested { suggestion } => Some(render_suggestion(suggestion)),
        EngineEvent::FixApplied { fix } => Some(match fix {
            AppliedFix::File {
                path,
                backup: Some(backup),
            } => format!(
                "    wrote {} (backup at {})",
                path.display(),
                backup.display()
            ),
            AppliedFix::File { path, backup: None } => format!("    wrote {}", path.display()),
            AppliedFix::Command { args } => {
                format!("    retrying with: {}", shell_words::join(args))
            }
        }),
        EngineEvent::PhaseFinished { outcome } => Some(render_phase_outcome(outcome)),
    }
}

/// Multi-line description of a suggestion.
pub fn render_suggestion(suggestion: &FixSuggestion) -> String {
    let mut lines = vec![
        format!(
            "--- suggested {} fix (confidence {:.0}%) ---",
            suggestion.kind.label(),
            suggestion.confidence * 100.0
        ),
        format!("reason: {}", suggestion.reason),
        format!("change: {}", suggestion.changes_summary),
    ];
    match &suggestion.kind {
        FixKind::Command {
            command,
            explanation,
        } => {
            lines.push(format!("command: {command}"));
            lines.extend(explanation.iter().map(|why| format!("why: {why}")));
        }
        FixKind::File {
            path,
            content,
            explanation,
        } => {
            lines.push(format!("file: {}", path.display()));
            lines.extend(explanation.iter().map(|why| format!("why: {why}")));
            lines.push(indent(content));
        }
        FixKind::Config { target, content } => {
            lines.push(format!("target: {}", target.display()));
            lines.push(indent(content));
        }
    }
    let text = lines.join("\n");
    text.trim_end().to_string()
}

fn render_phase_outcome(outcome: &PhaseOutcome) -> String {
    let phase = outcome.state.phase();
    let attempts = outcome.attempts();
    match &outcome.stop {
        PhaseStop::Succeeded => format!("<== [{phase}] succeeded after {attempts} attempt(s)"),
        PhaseStop::Exhausted => format!("<== [{phase}] failed: no attempts left ({attempts} used)"),
        PhaseStop::FixDisabled => format!("<== [{phase}] failed (fixing disabled)"),
        PhaseStop::SuggestionFailed { message } => {
            format!("<== [{phase}] failed: {message}")
        }
        PhaseStop::Declined => format!("<== [{phase}] failed: fix declined"),
    }
}

/// One-line summary of a whole workflow.
pub fn render_summary(outcome: &WorkflowOutcome) -> String {
    if outcome.succeeded {
        return "All phases succeeded.".to_string();
    }
    match outcome.failed_phase() {
        Some(failed) => format!(
            "Stopped in the {} phase ({}).",
            failed.state.phase(),
            failed.stop.as_str()
        ),
        None => "Stopped.".to_string(),
    }
}

fn indent(content: &str) -> String {
    content
        .lines()
        .map(|line| format!("    | {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..]
        .iter()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
