//! The suggestion seam: turning a failure into a typed [`FixSuggestion`].
//!
//! The [`Suggester`] trait keeps the fix loop independent of the backend.
//! [`AgentSuggester`] drives a Codex-compatible agent CLI; tests use scripted
//! suggesters that return canned outcomes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use jsonschema::Draft;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::error_context::tail_bytes;
use crate::core::suggestion::{FixKind, FixSuggestion};
use crate::core::types::Phase;
use crate::io::config::AgentConfig;
use crate::io::process::{ChildOptions, CommandOutput, run_child};
use crate::io::prompt::render_suggest_prompt;

const SUGGESTION_SCHEMA: &str = include_str!("schemas/fix_suggestion.schema.json");

/// Why no suggestion could be produced. Both kinds end the phase.
#[derive(Debug, Error)]
pub enum SuggestionError {
    /// The service could not be reached or did not answer.
    #[error("suggestion service unavailable: {0}")]
    Unavailable(String),
    /// The service answered with something that is not a valid suggestion.
    #[error("invalid suggestion response: {0}")]
    InvalidResponse(String),
}

/// Everything the suggestion step is told about a failure.
#[derive(Debug, Clone)]
pub struct SuggestRequest {
    pub error_context: String,
    pub cwd: PathBuf,
    /// Attempts already made before this one failed.
    pub prior_attempts: u32,
    pub phase: Phase,
    /// The failing command, rendered.
    pub command: String,
    /// Files whose content helps explain the failure, relative to `cwd`.
    pub context_files: Vec<PathBuf>,
}

pub trait Suggester {
    fn suggest(&self, request: &SuggestRequest) -> Result<FixSuggestion, SuggestionError>;
}

/// Response shape shared with the agent: one flat object, nullable payloads.
#[derive(Debug, Deserialize)]
struct WireSuggestion {
    reason: String,
    fix_type: String,
    command: Option<String>,
    command_explanation: Option<String>,
    file_path: Option<String>,
    new_content: Option<String>,
    file_explanation: Option<String>,
    dockerfile_path: Option<String>,
    dockerfile_content: Option<String>,
    confidence: f64,
    changes_summary: String,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(
    value: Option<String>,
    field: &str,
    fix_type: &str,
) -> Result<String, SuggestionError> {
    present(value).ok_or_else(|| {
        SuggestionError::InvalidResponse(format!("{fix_type} fix is missing {field}"))
    })
}

fn forbid(values: &[(&str, &Option<String>)], fix_type: &str) -> Result<(), SuggestionError> {
    for (field, value) in values {
        if value.as_deref().is_some_and(|v| !v.trim().is_empty()) {
            return Err(SuggestionError::InvalidResponse(format!(
                "{fix_type} fix must not set {field}"
            )));
        }
    }
    Ok(())
}

impl TryFrom<WireSuggestion> for FixSuggestion {
    type Error = SuggestionError;

    fn try_from(wire: WireSuggestion) -> Result<Self, Self::Error> {
        if !(0.0..=1.0).contains(&wire.confidence) {
            return Err(SuggestionError::InvalidResponse(format!(
                "confidence {} outside [0, 1]",
                wire.confidence
            )));
        }
        let fix_type = wire.fix_type.as_str();
        let kind = match fix_type {
            "command" => {
                forbid(
                    &[
                        ("file_path", &wire.file_path),
                        ("new_content", &wire.new_content),
                        ("dockerfile_path", &wire.dockerfile_path),
                        ("dockerfile_content", &wire.dockerfile_content),
                    ],
                    fix_type,
                )?;
                FixKind::Command {
                    command: required(wire.command, "command", fix_type)?,
                    explanation: present(wire.command_explanation),
                }
            }
            "file" => {
                forbid(
                    &[
                        ("command", &wire.command),
                        ("dockerfile_path", &wire.dockerfile_path),
                        ("dockerfile_content", &wire.dockerfile_content),
                    ],
                    fix_type,
                )?;
                FixKind::File {
                    path: PathBuf::from(required(wire.file_path, "file_path", fix_type)?),
                    content: wire.new_content.ok_or_else(|| {
                        SuggestionError::InvalidResponse("file fix is missing new_content".into())
                    })?,
                    explanation: present(wire.file_explanation),
                }
            }
            "config" | "docker" => {
                forbid(
                    &[
                        ("command", &wire.command),
                        ("file_path", &wire.file_path),
                        ("new_content", &wire.new_content),
                    ],
                    fix_type,
                )?;
                FixKind::Config {
                    target: PathBuf::from(required(
                        wire.dockerfile_path,
                        "dockerfile_path",
                        fix_type,
                    )?),
                    content: wire.dockerfile_content.ok_or_else(|| {
                        SuggestionError::InvalidResponse(
                            "config fix is missing dockerfile_content".into(),
                        )
                    })?,
                }
            }
            other => {
                return Err(SuggestionError::InvalidResponse(format!(
                    "unknown fix_type {other:?}"
                )));
            }
        };
        Ok(FixSuggestion {
            kind,
            reason: wire.reason,
            changes_summary: wire.changes_summary,
            confidence: wire.confidence,
        })
    }
}

/// Validate a raw agent response against the suggestion schema and convert it.
pub fn parse_suggestion(raw: &str) -> Result<FixSuggestion, SuggestionError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| SuggestionError::InvalidResponse(format!("not JSON: {err}")))?;
    validate_schema(&value)?;
    let wire: WireSuggestion = serde_json::from_value(value)
        .map_err(|err| SuggestionError::InvalidResponse(err.to_string()))?;
    FixSuggestion::try_from(wire)
}

/// Validate JSON instance against the suggestion schema (Draft 2020-12).
fn validate_schema(instance: &Value) -> Result<(), SuggestionError> {
    let schema: Value = serde_json::from_str(SUGGESTION_SCHEMA)
        .map_err(|err| SuggestionError::Unavailable(format!("parse embedded schema: {err}")))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| SuggestionError::Unavailable(format!("compile json schema: {err}")))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(SuggestionError::InvalidResponse(format!(
            "schema validation failed: {}",
            messages.join("; ")
        )));
    }
    Ok(())
}

/// Suggester backed by an agent CLI such as `codex exec`.
///
/// Each call gets its own scratch directory holding the prompt, the response
/// schema, the agent's final message and an `agent.log` of its output.
pub struct AgentSuggester<'a> {
    config: &'a AgentConfig,
    custom_prompt: Option<&'a str>,
    scratch_dir: PathBuf,
}

impl<'a> AgentSuggester<'a> {
    pub fn new(
        config: &'a AgentConfig,
        custom_prompt: Option<&'a str>,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            custom_prompt,
            scratch_dir,
        }
    }

    fn call_dir(&self) -> Result<PathBuf, SuggestionError> {
        let name = format!(
            "{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%.6f"),
            std::process::id()
        );
        let dir = self.scratch_dir.join(name);
        fs::create_dir_all(&dir).map_err(|err| {
            SuggestionError::Unavailable(format!("create {}: {err}", dir.display()))
        })?;
        Ok(dir)
    }

    fn command(&self, schema_path: &Path, output_path: &Path, cwd: &Path) -> Command {
        let mut cmd = Command::new(&self.config.command[0]);
        cmd.args(&self.config.command[1..]);
        if let Some(model) = &self.config.model {
            cmd.arg("--model").arg(model);
        }
        cmd.arg("--output-schema")
            .arg(schema_path)
            .arg("--output-last-message")
            .arg(output_path)
            .arg("-")
            .current_dir(cwd);
        cmd
    }
}

impl Suggester for AgentSuggester<'_> {
    #[instrument(skip_all, fields(phase = %request.phase, prior_attempts = request.prior_attempts))]
    fn suggest(&self, request: &SuggestRequest) -> Result<FixSuggestion, SuggestionError> {
        let unavailable = |context: &str, err: &dyn std::fmt::Display| {
            SuggestionError::Unavailable(format!("{context}: {err}"))
        };

        let prompt = render_suggest_prompt(request, self.custom_prompt)
            .map_err(|err| SuggestionError::Unavailable(format!("{err:#}")))?;
        let dir = self.call_dir()?;
        let schema_path = dir.join("schema.json");
        let output_path = dir.join("output.json");
        let log_path = dir.join("agent.log");
        fs::write(&schema_path, SUGGESTION_SCHEMA)
            .map_err(|err| unavailable("write schema", &err))?;
        fs::write(dir.join("prompt.md"), &prompt)
            .map_err(|err| unavailable("write prompt", &err))?;

        info!(agent = %self.config.command[0], dir = %dir.display(), "requesting fix suggestion");
        let output = run_child(
            self.command(&schema_path, &output_path, &request.cwd),
            ChildOptions {
                stdin: Some(prompt.as_bytes()),
                timeout: Some(self.config.timeout()),
                output_limit_bytes: self.config.output_limit_bytes,
                stdout_tee: None,
            },
        )
        .map_err(|err| unavailable("run agent", &err))?;

        if let Err(err) = write_agent_log(&log_path, &output, self.config.output_limit_bytes) {
            warn!(path = %log_path.display(), err = %err, "failed to write agent log");
        }

        if output.timed_out {
            return Err(SuggestionError::Unavailable(format!(
                "agent timed out after {}s",
                self.config.timeout_secs
            )));
        }
        if !output.status.success() {
            return Err(SuggestionError::Unavailable(format!(
                "agent exited with status {} (see {})",
                output.exit_code(),
                log_path.display()
            )));
        }

        let raw = fs::read_to_string(&output_path).map_err(|err| {
            SuggestionError::Unavailable(format!(
                "missing agent output {}: {err}",
                output_path.display()
            ))
        })?;
        let suggestion = parse_suggestion(&raw)?;
        debug!(
            kind = suggestion.kind.label(),
            confidence = suggestion.confidence,
            "parsed suggestion"
        );
        Ok(suggestion)
    }
}

fn write_agent_log(
    path: &Path,
    output: &CommandOutput,
    output_limit: usize,
) -> std::io::Result<()> {
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&output.stdout_lossy());
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&output.stderr_lossy());
    buf.push_str(&output.truncated_notice("agent"));
    if output.timed_out {
        buf.push_str("\n[agent timed out]\n");
    }
    fs::write(path, tail_bytes(&buf, output_limit))
}
