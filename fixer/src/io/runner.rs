//! Command execution behind the [`CommandRunner`] seam.

use std::io::Write;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::core::types::{CommandResult, CommandSpec};
use crate::io::process::{ChildOptions, LaunchError, run_child};

/// Executes one command and reports its outcome.
///
/// A non-zero exit is a normal [`CommandResult`]; only a failure to start the
/// process is an error.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec, stream: bool) -> Result<CommandResult, LaunchError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    fn stdout_tee(stream: bool) -> Option<Box<dyn Write + Send>> {
        stream.then(|| Box::new(std::io::stdout()) as Box<dyn Write + Send>)
    }
}

impl CommandRunner for ProcessRunner {
    #[instrument(skip_all, fields(command = %spec.rendered(), cwd = %spec.cwd().display(), stream = stream))]
    fn run(&self, spec: &CommandSpec, stream: bool) -> Result<CommandResult, LaunchError> {
        if !spec.cwd().is_dir() {
            return Err(LaunchError::MissingCwd {
                path: spec.cwd().to_path_buf(),
            });
        }

        let mut cmd = Command::new(spec.program());
        cmd.args(&spec.args()[1..])
            .current_dir(spec.cwd())
            .envs(spec.env());

        info!("running command");
        let output = run_child(
            cmd,
            ChildOptions {
                timeout: self.timeout,
                stdout_tee: Self::stdout_tee(stream),
                ..ChildOptions::default()
            },
        )?;

        let exit_code = output.exit_code();
        debug!(
            exit_code,
            timed_out = output.timed_out,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "command finished"
        );
        let stdout = output.stdout_lossy();
        let stderr = output.stderr_lossy();
        Ok(if output.timed_out {
            CommandResult::timed_out(spec, exit_code, stdout, stderr)
        } else {
            CommandResult::exited(spec, exit_code, stdout, stderr)
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn spec(dir: &std::path::Path, args: &[&str]) -> CommandSpec {
        CommandSpec::new(args.iter().map(|s| s.to_string()).collect(), dir).expect("spec")
    }

    #[test]
    fn runs_in_the_requested_directory_with_env() {
        let temp = tempfile::tempdir().expect("tempdir");
        let spec = spec(temp.path(), &["sh", "-c", "pwd; printf %s \"$FIXER_MARKER\""])
            .with_env("FIXER_MARKER", "marker-value");

        let result = ProcessRunner::default().run(&spec, false).expect("run");

        assert!(result.success());
        let canonical = temp.path().canonicalize().expect("canonicalize");
        assert!(result.stdout().contains(&canonical.display().to_string()));
        assert!(result.stdout().ends_with("marker-value"));
        assert_eq!(result.command(), spec.rendered());
    }

    #[test]
    fn non_zero_exit_is_a_result_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = ProcessRunner::default()
            .run(&spec(temp.path(), &["sh", "-c", "echo boom >&2; exit 4"]), false)
            .expect("run");
        assert_eq!(result.exit_code(), 4);
        assert!(!result.success());
        assert_eq!(result.stderr(), "boom\n");
    }

    #[test]
    fn streaming_still_buffers_stdout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = ProcessRunner::default()
            .run(&spec(temp.path(), &["echo", "streamed"]), true)
            .expect("run");
        assert_eq!(result.stdout(), "streamed\n");
    }

    #[test]
    fn missing_executable_is_a_launch_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = ProcessRunner::default()
            .run(&spec(temp.path(), &["no-such-binary-for-fixer"]), false)
            .unwrap_err();
        assert!(matches!(err, LaunchError::NotFound { .. }));
    }

    #[test]
    fn missing_directory_is_a_launch_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = ProcessRunner::default()
            .run(&spec(&temp.path().join("gone"), &["true"]), false)
            .unwrap_err();
        assert!(matches!(err, LaunchError::MissingCwd { .. }));
    }

    #[test]
    fn timeout_produces_a_timed_out_result() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ProcessRunner::new(Some(Duration::from_millis(100)));
        let result = runner
            .run(&spec(temp.path(), &["sleep", "5"]), false)
            .expect("run");
        assert!(result.is_timed_out());
        assert!(!result.success());
    }
}
