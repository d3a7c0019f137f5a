//! Asking the operator whether to apply a suggestion.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::core::suggestion::FixSuggestion;

pub trait Confirmer {
    /// `Ok(false)` means the operator declined.
    fn confirm(&self, suggestion: &FixSuggestion) -> Result<bool>;
}

/// Accepts every suggestion (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl Confirmer for AutoConfirm {
    fn confirm(&self, _suggestion: &FixSuggestion) -> Result<bool> {
        Ok(true)
    }
}

/// Prompts on stderr and reads one answer line from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, _suggestion: &FixSuggestion) -> Result<bool> {
        let stdin = std::io::stdin();
        ask(&mut stdin.lock(), &mut std::io::stderr())
    }
}

/// Ask `Apply this fix? [Y/n]`. An empty answer accepts; end of input declines.
pub fn ask<R: BufRead, W: Write>(input: &mut R, prompt: &mut W) -> Result<bool> {
    write!(prompt, "Apply this fix? [Y/n] ").context("write confirmation prompt")?;
    prompt.flush().context("flush confirmation prompt")?;

    let mut line = String::new();
    let read = input.read_line(&mut line).context("read confirmation")?;
    if read == 0 {
        return Ok(false);
    }
    Ok(matches!(
        line.trim().to_ascii_lowercase().as_str(),
        "" | "y" | "yes"
    ))
}
