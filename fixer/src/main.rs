//! Run a build or run command and repair its failures with an agent.
//!
//! Commands are executed, their results stored by fingerprint, and failures
//! handed to a suggestion agent whose fixes are applied before retrying.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};

use fixer::console::{render_event, render_suggestion, render_summary};
use fixer::core::error_context::tail_bytes;
use fixer::core::types::{CommandSpec, Phase};
use fixer::docker::{DockerBuild, DockerRun, parse_key_value};
use fixer::engine::{EngineConfig, EngineEvent, FixLoopEngine, PhasePlan};
use fixer::exit_codes;
use fixer::io::attempt_log::AttemptLog;
use fixer::io::config::{FixerConfig, default_config_path, load_config, write_config};
use fixer::io::confirm::{AutoConfirm, Confirmer, StdinConfirmer};
use fixer::io::result_store::ResultStore;
use fixer::io::runner::ProcessRunner;
use fixer::io::suggest::{AgentSuggester, SuggestRequest, Suggester};
use fixer::logging;
use fixer::signals;
use fixer::workflow::run_phases;

#[derive(Parser)]
#[command(
    name = "fixer",
    version,
    about = "Run a command, and when it fails, ask an agent for a fix and retry"
)]
struct Cli {
    /// Config file (default: <config dir>/fixer/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level diagnostics on stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a command with automatic fixing.
    Run(RunArgs),
    /// Build a Docker image and run it, fixing failures in either phase.
    Docker(DockerArgs),
    /// Ask for a fix for an existing error log without running or applying anything.
    Analyze(AnalyzeArgs),
    /// Inspect stored command results.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Manage the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug)]
struct FixArgs {
    /// Stop at the first failure instead of asking for a fix.
    #[arg(long)]
    no_fix: bool,

    /// Ignore stored results and always execute.
    #[arg(long)]
    force: bool,

    /// Apply suggestions without asking.
    #[arg(short, long)]
    yes: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Working directory (default: current directory).
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Attempt budget (default: from config).
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Kill the command after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Extra environment variable, KEY=VALUE. Repeatable.
    #[arg(long = "env", value_parser = parse_key_value)]
    env: Vec<(String, String)>,

    #[command(flatten)]
    fix: FixArgs,

    /// The command to run.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[derive(Args, Debug)]
struct DockerArgs {
    /// Build context.
    #[arg(default_value = ".")]
    context: String,

    /// Dockerfile path.
    #[arg(short = 'f', long = "file", default_value = "Dockerfile")]
    file: String,

    /// Image tag.
    #[arg(short, long, default_value = "fixer-app:latest")]
    tag: String,

    /// Only build the image.
    #[arg(long, conflicts_with = "run_only")]
    build_only: bool,

    /// Only run an existing image.
    #[arg(long)]
    run_only: bool,

    /// Extra `docker run` arguments, shell-quoted as one string.
    #[arg(long, allow_hyphen_values = true)]
    run_args: Option<String>,

    /// Build argument, KEY=VALUE. Repeatable.
    #[arg(long = "build-arg", value_parser = parse_key_value)]
    build_args: Vec<(String, String)>,

    /// Build without the Docker layer cache.
    #[arg(long)]
    no_cache: bool,

    /// Attempt budget per phase (default: from config).
    #[arg(long)]
    retry: Option<u32>,

    #[command(flatten)]
    fix: FixArgs,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Error log file (default: read stdin).
    #[arg(long)]
    log: Option<PathBuf>,

    /// Working directory the error came from.
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// The command that failed, for context.
    #[arg(long)]
    command: Option<String>,

    /// Phase the error came from.
    #[arg(long, default_value = "run", value_parser = parse_phase)]
    phase: Phase,

    /// File to include as context, relative to the working directory. Repeatable.
    #[arg(long = "context-file")]
    context_files: Vec<PathBuf>,

    /// Save the suggestion as JSON.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Print the results directory.
    Path,
    /// List stored results.
    List,
    /// Show one stored result.
    Show { fingerprint: String },
    /// Delete all stored results.
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved config.
    Show,
}

fn parse_phase(raw: &str) -> Result<Phase, String> {
    match raw {
        "build" => Ok(Phase::Build),
        "run" => Ok(Phase::Run),
        other => Err(format!("unknown phase {other:?} (expected build or run)")),
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    signals::install();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config_path = cli.config.or_else(default_config_path);
    let config_path = config_path.as_deref();
    match cli.command {
        Command::Run(args) => cmd_run(&resolve_config(config_path)?, args),
        Command::Docker(args) => cmd_docker(&resolve_config(config_path)?, args),
        Command::Analyze(args) => cmd_analyze(&resolve_config(config_path)?, args),
        Command::Cache { action } => cmd_cache(&resolve_config(config_path)?, action),
        Command::Config { action } => cmd_config(config_path, &action),
    }
}

fn resolve_config(path: Option<&Path>) -> Result<FixerConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(FixerConfig::default()),
    }
}

fn resolve_cwd(cwd: Option<PathBuf>) -> Result<PathBuf> {
    match cwd {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("resolve current directory"),
    }
}

fn cmd_run(cfg: &FixerConfig, args: RunArgs) -> Result<i32> {
    let cwd = resolve_cwd(args.cwd)?;
    let phase = Phase::infer(&args.command);
    let mut spec = CommandSpec::new(args.command, &cwd).context("build command")?;
    for (key, value) in args.env {
        spec = spec.with_env(key, value);
    }
    let max_attempts = args
        .max_attempts
        .unwrap_or_else(|| cfg.max_attempts_for(phase));
    let timeout = args
        .timeout_secs
        .map(Duration::from_secs)
        .or_else(|| cfg.command_timeout());
    let plans = vec![PhasePlan::new(phase, spec, max_attempts)];
    run_workflow(cfg, &args.fix, timeout, &plans)
}

fn cmd_docker(cfg: &FixerConfig, args: DockerArgs) -> Result<i32> {
    let cwd = resolve_cwd(None)?;
    let plans = docker_plans(cfg, &args, &cwd)?;
    run_workflow(cfg, &args.fix, cfg.command_timeout(), &plans)
}

/// Build and run phases for `fixer docker`. Both phases see the Dockerfile.
fn docker_plans(cfg: &FixerConfig, args: &DockerArgs, cwd: &Path) -> Result<Vec<PhasePlan>> {
    let dockerfile = if args.file == "Dockerfile" {
        Path::new(&args.context).join("Dockerfile")
    } else {
        PathBuf::from(&args.file)
    };
    let mut plans = Vec::new();

    if !args.run_only {
        let build = DockerBuild {
            context: args.context.clone(),
            dockerfile: args.file.clone(),
            tag: args.tag.clone(),
            build_args: args.build_args.clone(),
            no_cache: args.no_cache,
        };
        let mut spec = CommandSpec::new(build.argv(), cwd).context("build docker command")?;
        for (key, value) in DockerBuild::ENV {
            spec = spec.with_env(key, value);
        }
        let max_attempts = args
            .retry
            .unwrap_or_else(|| cfg.max_attempts_for(Phase::Build));
        plans.push(
            PhasePlan::new(Phase::Build, spec, max_attempts).with_context_file(dockerfile.clone()),
        );
    }

    if !args.build_only {
        let run_args = match &args.run_args {
            Some(raw) => shell_words::split(raw)
                .map_err(|err| anyhow!("parse --run-args {raw:?}: {err}"))?,
            None => Vec::new(),
        };
        let run = DockerRun {
            image: args.tag.clone(),
            args: run_args,
        };
        let spec = CommandSpec::new(run.argv(), cwd).context("build docker command")?;
        let max_attempts = args
            .retry
            .unwrap_or_else(|| cfg.max_attempts_for(Phase::Run));
        plans.push(PhasePlan::new(Phase::Run, spec, max_attempts).with_context_file(dockerfile));
    }

    Ok(plans)
}

fn run_workflow(
    cfg: &FixerConfig,
    fix: &FixArgs,
    timeout: Option<Duration>,
    plans: &[PhasePlan],
) -> Result<i32> {
    let engine_config = EngineConfig {
        force_rerun: fix.force,
        fix_enabled: !fix.no_fix,
        error_context_limit_bytes: cfg.error_context_limit_bytes,
        stream_output: true,
    };
    let store = ResultStore::new(cfg.results_dir());
    let runner = ProcessRunner::new(timeout);
    let suggester = AgentSuggester::new(&cfg.agent, cfg.custom_prompt.as_deref(), cfg.agent_dir());
    let log = AttemptLog::start(&cfg.attempts_dir());
    let parts = WorkflowParts {
        config: &engine_config,
        store: &store,
        runner: &runner,
        suggester: &suggester,
        log: &log,
    };
    if fix.yes {
        drive(&parts, &AutoConfirm, plans)
    } else {
        drive(&parts, &StdinConfirmer, plans)
    }
}

struct WorkflowParts<'a, S> {
    config: &'a EngineConfig,
    store: &'a ResultStore,
    runner: &'a ProcessRunner,
    suggester: &'a S,
    log: &'a AttemptLog,
}

fn drive<S: Suggester, C: Confirmer>(
    parts: &WorkflowParts<'_, S>,
    confirmer: &C,
    plans: &[PhasePlan],
) -> Result<i32> {
    let engine = FixLoopEngine::new(
        parts.config,
        parts.store,
        parts.runner,
        parts.suggester,
        confirmer,
    )
    .with_attempt_log(parts.log);
    let outcome = run_phases(&engine, plans, print_event)?;
    eprintln!("{}", render_summary(&outcome));
    Ok(if outcome.succeeded {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn print_event(event: &EngineEvent<'_>) {
    if let Some(text) = render_event(event) {
        eprintln!("{text}");
    }
}

fn cmd_analyze(cfg: &FixerConfig, args: AnalyzeArgs) -> Result<i32> {
    let log = match &args.log {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
        }
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read error log from stdin")?;
            buf
        }
    };
    if log.trim().is_empty() {
        bail!("error log is empty");
    }

    let request = SuggestRequest {
        error_context: tail_bytes(&log, cfg.error_context_limit_bytes),
        cwd: std::path::absolute(resolve_cwd(args.cwd)?).context("resolve working directory")?,
        prior_attempts: 0,
        phase: args.phase,
        command: args.command.unwrap_or_else(|| "(unknown)".to_string()),
        context_files: args.context_files,
    };
    let suggester = AgentSuggester::new(&cfg.agent, cfg.custom_prompt.as_deref(), cfg.agent_dir());
    let suggestion = suggester.suggest(&request)?;
    println!("{}", render_suggestion(&suggestion));

    if let Some(path) = &args.output {
        let mut buf = serde_json::to_string_pretty(&suggestion).context("serialize suggestion")?;
        buf.push('\n');
        fs::write(path, buf).with_context(|| format!("write {}", path.display()))?;
        eprintln!("Saved suggestion to {}", path.display());
    }
    Ok(exit_codes::OK)
}

fn cmd_cache(cfg: &FixerConfig, action: CacheAction) -> Result<i32> {
    let store = ResultStore::new(cfg.results_dir());
    match action {
        CacheAction::Path => println!("{}", store.root().display()),
        CacheAction::List => {
            for entry in store.list()? {
                let meta = entry.metadata;
                println!(
                    "{}  {:>4}  {}  ({})",
                    entry.fingerprint,
                    meta.exit_code,
                    meta.command,
                    meta.cwd.display()
                );
            }
        }
        CacheAction::Show { fingerprint } => {
            let result = store.read(&fingerprint)?;
            let meta = store.read_metadata(&fingerprint)?;
            println!("command:   {}", result.command());
            println!("cwd:       {}", result.cwd().display());
            println!("exit code: {}", result.exit_code());
            println!("success:   {}", result.success());
            if result.is_timed_out() {
                println!("timed out: true");
            }
            if let Some(recorded_at) = meta.recorded_at {
                println!("recorded:  {recorded_at}");
            }
            println!("--- stdout ---\n{}", result.stdout().trim_end());
            println!("--- stderr ---\n{}", result.stderr().trim_end());
        }
        CacheAction::Clear => {
            let removed = store.clear()?;
            println!("Removed {removed} stored result(s) from {}", store.root().display());
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_config(path: Option<&Path>, action: &ConfigAction) -> Result<i32> {
    let path = path.ok_or_else(|| anyhow!("no config directory on this platform; pass --config"))?;
    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            write_config(path, &FixerConfig::default())?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Show => {
            let cfg = load_config(path)?;
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&cfg).context("serialize config toml")?);
        }
    }
    Ok(exit_codes::OK)
}
