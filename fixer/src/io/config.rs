//! Fixer configuration stored at `<config dir>/fixer/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::Phase;

/// Fixer configuration (TOML).
///
/// Missing fields take their defaults, so an absent file is a valid config.
/// Built once in `main` and passed down by reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FixerConfig {
    /// Attempt budget for a phase without its own override.
    pub max_attempts: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_max_attempts: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_max_attempts: Option<u32>,

    /// Kill the command after this many seconds. Unlimited when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,

    /// Tail of the failing output handed to the suggestion step.
    pub error_context_limit_bytes: usize,

    /// Root for results, attempt logs and agent scratch files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Extra requirements appended to every suggestion prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,

    pub agent: AgentConfig,
}

/// How the suggestion agent is invoked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent CLI argv, e.g. `["codex","exec"]`. Schema/output flags are appended.
    pub command: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub timeout_secs: u64,

    /// Truncate agent stdout/stderr logs beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: [
                "codex",
                "exec",
                "--skip-git-repo-check",
                "--sandbox",
                "read-only",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            model: None,
            timeout_secs: 300,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FixerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            build_max_attempts: None,
            run_max_attempts: None,
            command_timeout_secs: None,
            error_context_limit_bytes: 20_000,
            cache_dir: None,
            custom_prompt: None,
            agent: AgentConfig::default(),
        }
    }
}

impl FixerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be >= 1"));
        }
        if self.build_max_attempts == Some(0) {
            return Err(anyhow!("build_max_attempts must be >= 1"));
        }
        if self.run_max_attempts == Some(0) {
            return Err(anyhow!("run_max_attempts must be >= 1"));
        }
        if self.command_timeout_secs == Some(0) {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.error_context_limit_bytes == 0 {
            return Err(anyhow!("error_context_limit_bytes must be > 0"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.output_limit_bytes == 0 {
            return Err(anyhow!("agent.output_limit_bytes must be > 0"));
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        Ok(())
    }

    /// Attempt budget for `phase`, honoring the per-phase overrides.
    pub fn max_attempts_for(&self, phase: Phase) -> u32 {
        let specific = match phase {
            Phase::Build => self.build_max_attempts,
            Phase::Run => self.run_max_attempts,
        };
        specific.unwrap_or(self.max_attempts)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    /// Resolved cache root: `cache_dir`, else the OS cache dir, else `./.fixer-cache`.
    pub fn cache_root(&self) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir()
                .map(|dir| dir.join("fixer"))
                .unwrap_or_else(|| PathBuf::from(".fixer-cache")),
        }
    }

    pub fn results_dir(&self) -> PathBuf {
        self.cache_root().join("results")
    }

    pub fn attempts_dir(&self) -> PathBuf {
        self.cache_root().join("attempts")
    }

    pub fn agent_dir(&self) -> PathBuf {
        self.cache_root().join("agent")
    }
}

/// `<OS config dir>/fixer/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fixer").join("config.toml"))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FixerConfig::default()`.
pub fn load_config(path: &Path) -> Result<FixerConfig> {
    if !path.exists() {
        let cfg = FixerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FixerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FixerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
