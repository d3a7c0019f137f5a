//! Suggestion prompt rendering.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::{debug, warn};

use crate::io::suggest::SuggestRequest;

const SUGGEST_TEMPLATE: &str = include_str!("prompts/suggest.md");

/// At most this many working-directory entries are shown to the agent.
pub const MAX_LISTING_ENTRIES: usize = 25;

#[derive(Debug, Clone, Serialize)]
struct ContextFile {
    path: String,
    content: String,
}

/// Render the prompt for one suggestion request.
pub fn render_suggest_prompt(
    request: &SuggestRequest,
    custom_prompt: Option<&str>,
) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("suggest", SUGGEST_TEMPLATE)
        .context("load suggest template")?;
    let template = env.get_template("suggest")?;

    let listing = directory_listing(&request.cwd, MAX_LISTING_ENTRIES);
    let context_files = load_context_files(&request.cwd, &request.context_files);
    let rendered = template
        .render(context! {
            phase => request.phase.as_str(),
            cwd => request.cwd.display().to_string(),
            command => request.command.as_str(),
            listing => listing,
            context_files => context_files,
            error_context => request.error_context.trim_end(),
            prior_attempts => request.prior_attempts,
            custom_prompt => custom_prompt.map(str::trim).filter(|s| !s.is_empty()),
        })
        .context("render suggest template")?;
    debug!(bytes = rendered.len(), "rendered suggestion prompt");
    Ok(rendered)
}

/// Sorted entry names of `dir`, directories suffixed with `/`, capped at `limit`.
///
/// An unreadable directory yields an empty listing.
pub fn directory_listing(dir: &Path, limit: usize) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), err = %err, "cannot list working directory");
            return Vec::new();
        }
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            name
        })
        .collect();
    names.sort();
    if names.len() > limit {
        let hidden = names.len() - limit;
        names.truncate(limit);
        names.push(format!("... ({hidden} more)"));
    }
    names
}

fn load_context_files(cwd: &Path, paths: &[std::path::PathBuf]) -> Vec<ContextFile> {
    paths
        .iter()
        .filter_map(|path| {
            let full = cwd.join(path);
            match fs::read_to_string(&full) {
                Ok(content) => Some(ContextFile {
                    path: path.display().to_string(),
                    content,
                }),
                Err(err) => {
                    warn!(path = %full.display(), err = %err, "skipping unreadable context file");
                    None
                }
            }
        })
        .collect()
}
