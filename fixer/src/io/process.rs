//! Helpers for running child processes with optional timeouts, bounded output and
//! live line forwarding.
//!
//! On Unix every child leads its own process group. A timeout or an interrupt
//! kills the whole group, so grandchildren holding the output pipes die too.

use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Process groups of children that are currently running.
static ACTIVE_GROUPS: Mutex<BTreeSet<u32>> = Mutex::new(BTreeSet::new());

/// Failure to launch or supervise a child process. Never retried.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("command not found: {program}")]
    NotFound { program: String },
    #[error("working directory does not exist: {}", path.display())]
    MissingCwd { path: std::path::PathBuf },
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("child {0} was not piped")]
    NotPiped(&'static str),
    #[error("{0} reader thread panicked")]
    ReaderPanicked(&'static str),
}

impl LaunchError {
    fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| LaunchError::Io { context, source }
    }
}

/// Registers a running child's process group until dropped.
struct GroupGuard(u32);

impl GroupGuard {
    fn register(pid: u32) -> Self {
        match ACTIVE_GROUPS.lock() {
            Ok(mut groups) => {
                groups.insert(pid);
            }
            Err(err) => error!(err = %err, "failed to lock active process groups"),
        }
        Self(pid)
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Ok(mut groups) = ACTIVE_GROUPS.lock() {
            groups.remove(&self.0);
        }
    }
}

/// Process groups of the children started by [`run_child`] that have not been reaped.
pub fn active_groups() -> Vec<u32> {
    ACTIVE_GROUPS
        .lock()
        .map(|groups| groups.iter().copied().collect())
        .unwrap_or_default()
}

/// Kill every running child's process group. Used on interrupt before exiting.
pub fn kill_active_children() {
    for pgid in active_groups() {
        warn!(pgid, "killing child process group");
        if let Err(err) = kill_group(pgid) {
            warn!(pgid, err = %err, "failed to kill child process group");
        }
    }
}

#[cfg(unix)]
fn isolate_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate_group(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_group(pgid: u32) -> std::io::Result<()> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pgid).map_err(std::io::Error::other)?;
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(errno) => Err(std::io::Error::from(errno)),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) -> std::io::Result<()> {
    Ok(())
}

/// Kill the child with its whole process group, then reap it.
fn kill_and_reap(child: &mut Child) -> Result<ExitStatus, LaunchError> {
    if let Err(err) = kill_group(child.id()) {
        warn!(err = %err, "failed to kill process group, killing the child only");
    }
    match child.kill() {
        Ok(()) => {}
        // Already exited: nothing left to kill.
        Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => {}
        Err(err) => {
            return Err(LaunchError::Io {
                context: "kill command",
                source: err,
            });
        }
    }
    child.wait().map_err(LaunchError::io("wait command after kill"))
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl CommandOutput {
    /// Exit code as an integer; on Unix a signal death maps to `128 + signal`.
    pub fn exit_code(&self) -> i32 {
        exit_code_of(self.status)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn truncated_notice(&self, label: &str) -> String {
        let mut notice = String::new();
        if self.stdout_truncated > 0 {
            notice.push_str(&format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        if self.stderr_truncated > 0 {
            notice.push_str(&format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        notice
    }
}

/// Options for [`run_child`].
pub struct ChildOptions<'a> {
    /// Bytes written to the child's stdin (stdin is null when `None`).
    pub stdin: Option<&'a [u8]>,
    /// Hard wall-clock limit; the child is killed when it is exceeded.
    pub timeout: Option<Duration>,
    /// Bound on bytes kept per stream. Bytes past the bound are drained and counted.
    pub output_limit_bytes: usize,
    /// Receives each stdout line as soon as it is read.
    pub stdout_tee: Option<Box<dyn Write + Send>>,
}

impl Default for ChildOptions<'_> {
    fn default() -> Self {
        Self {
            stdin: None,
            timeout: None,
            output_limit_bytes: usize::MAX,
            stdout_tee: None,
        }
    }
}

/// Run a command and capture stdout/stderr without risking pipe deadlocks.
///
/// Both streams are read concurrently while the child runs. When a tee is given,
/// stdout is forwarded line by line (flushing each line) and still returned in full.
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = options.timeout.map(|t| t.as_secs()), streaming = options.stdout_tee.is_some()))]
pub fn run_child(
    mut cmd: Command,
    options: ChildOptions<'_>,
) -> Result<CommandOutput, LaunchError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    if options.stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    isolate_group(&mut cmd);

    debug!("spawning child process");
    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error!(program = %program, "command not found");
            return Err(LaunchError::NotFound { program });
        }
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(LaunchError::Spawn { program, source: e });
        }
    };
    let group = GroupGuard::register(child.id());

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        kill_and_reap(&mut child)?;
        return Err(LaunchError::NotPiped("stdout/stderr"));
    };

    let limit = options.output_limit_bytes;
    let tee = options.stdout_tee;
    let stdout_handle = thread::spawn(move || read_lines_with_tee(stdout, limit, tee));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));

    if let Some(input) = options.stdin {
        let Some(mut child_stdin) = child.stdin.take() else {
            kill_and_reap(&mut child)?;
            return Err(LaunchError::NotPiped("stdin"));
        };
        // A child that exits without reading its input closes the pipe early.
        if let Err(e) = child_stdin.write_all(input) {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                drop(child_stdin);
                kill_and_reap(&mut child)?;
                return Err(LaunchError::Io {
                    context: "write stdin",
                    source: e,
                });
            }
            warn!("child closed stdin before reading all input");
        }
    }

    let mut timed_out = false;
    let status = match options.timeout {
        Some(timeout) => match child
            .wait_timeout(timeout)
            .map_err(LaunchError::io("wait for command"))?
        {
            Some(status) => status,
            None => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "command timed out, killing its process group"
                );
                timed_out = true;
                kill_and_reap(&mut child)?
            }
        },
        None => child.wait().map_err(LaunchError::io("wait for command"))?,
    };
    drop(group);

    let (stdout, stdout_truncated) = join_output(stdout_handle, "stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle, "stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        elapsed: started.elapsed(),
    })
}

fn join_output(
    handle: thread::JoinHandle<std::io::Result<(Vec<u8>, usize)>>,
    label: &'static str,
) -> Result<(Vec<u8>, usize), LaunchError> {
    match handle.join() {
        Ok(result) => result.map_err(|source| LaunchError::Io {
            context: if label == "stdout" {
                "read stdout"
            } else {
                "read stderr"
            },
            source,
        }),
        Err(_) => Err(LaunchError::ReaderPanicked(label)),
    }
}

/// Read a stream line by line with a size limit, optionally forwarding each line.
fn read_lines_with_tee<R: Read>(
    reader: R,
    limit: usize,
    mut tee: Option<Box<dyn Write + Send>>,
) -> std::io::Result<(Vec<u8>, usize)> {
    let mut buf_reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;

    loop {
        let mut line = Vec::new();
        let n = buf_reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }

        if let Some(writer) = tee.as_mut() {
            // Forwarding is best effort: a closed console must not fail the capture.
            if let Err(e) = writer.write_all(&line).and_then(|()| writer.flush()) {
                warn!(err = %e, "failed to forward output line");
                tee = None;
            }
        }

        let remaining = limit.saturating_sub(collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.extend_from_slice(&line[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((collected, truncated))
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> std::io::Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
