/// Process Engine - Local Subprocess Execution
///
/// **Core Responsibility:**
/// Run a test's setup and run commands through the shell and capture raw
/// outputs, classified into a `FailureKind`.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (shell, pipes, process groups, timeouts)
/// - Engine does NOT know scoring rules
/// - Engine does NOT compare outputs
///
/// **Lifecycle Guarantees:**
/// - Every command runs in its own process group
/// - On timeout the whole group is killed with SIGKILL and the child is reaped
/// - After a normal exit the group is killed too, so background descendants
///   never outlive the test case
/// - stdout/stderr are drained concurrently with the wait, so a chatty
///   process cannot block on a full pipe
use crate::evaluator::{ExecutionOutcome, FailureKind};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io;
use std::os::fd::OwnedFd;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// How long to wait for pipe readers once the process group is gone
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK_BYTES: usize = 8192;

const DECODE_ERROR_HINT: &str = "Output decode error: \
the program wrote bytes that are not valid UTF-8. \
This is usually caused by missing or incorrect initialization \
(e.g. printing an uninitialized buffer).";

/// Where the child's error stream goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    /// stdout and stderr captured independently
    Separate,
    /// stderr shares stdout's pipe
    Merged,
}

/// Unclassified result of one `run_with_timeout` call
#[derive(Debug)]
struct RawExecution {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<i32>,
    success: bool,
    timed_out: bool,
    elapsed: Duration,
}

/// Convert a declared timeout to a `Duration`. Non-positive or NaN values time
/// out immediately; values beyond `Duration`'s range saturate.
pub fn timeout_from_secs(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

/// Shell-based execution engine for setup and run commands
#[derive(Debug, Clone)]
pub struct LocalEngine {
    shell: String,
    setup_timeout: Duration,
}

impl LocalEngine {
    pub fn new(setup_timeout: Duration) -> Self {
        Self {
            shell: "sh".to_string(),
            setup_timeout,
        }
    }

    /// Run a setup (build) command. Any non-zero exit, spawn failure or
    /// setup timeout is reported as `BuildFailed`; stderr is folded into stdout.
    #[instrument(skip(self))]
    pub async fn run_setup(&self, command: &str) -> ExecutionOutcome {
        if command.trim().is_empty() {
            return ExecutionOutcome::default();
        }

        let raw = match self
            .run_with_timeout(command, "", self.setup_timeout, Capture::Merged)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to spawn setup command");
                return ExecutionOutcome {
                    failure_kind: FailureKind::BuildFailed,
                    diagnostic: Some(format!("Failed to start setup command: {}", e)),
                    ..Default::default()
                };
            }
        };

        let output = String::from_utf8_lossy(&raw.stdout).into_owned();
        let elapsed_seconds = raw.elapsed.as_secs_f64();

        if raw.success && !raw.timed_out {
            debug!(elapsed_ms = raw.elapsed.as_millis() as u64, "Setup succeeded");
            return ExecutionOutcome {
                stdout: output,
                exit_code: raw.exit_code,
                elapsed_seconds,
                ..Default::default()
            };
        }

        let diagnostic = if raw.timed_out {
            format!(
                "Setup did not finish within {} seconds",
                self.setup_timeout.as_secs_f64()
            )
        } else {
            match raw.exit_code {
                Some(code) => format!("Setup exited with status {}", code),
                None => "Setup was terminated by a signal".to_string(),
            }
        };
        warn!(exit_code = ?raw.exit_code, timed_out = raw.timed_out, "Setup failed");

        ExecutionOutcome {
            stdout: output,
            stderr: String::new(),
            failure_kind: FailureKind::BuildFailed,
            elapsed_seconds,
            exit_code: raw.exit_code,
            diagnostic: Some(diagnostic),
        }
    }

    /// Run the command under test, feeding `input` and enforcing `timeout`
    #[instrument(
        skip(self, input),
        fields(input_bytes = input.len(), timeout_ms = timeout.as_millis() as u64)
    )]
    pub async fn run_target(
        &self,
        command: &str,
        input: &str,
        timeout: Duration,
    ) -> ExecutionOutcome {
        let raw = match self
            .run_with_timeout(command, input, timeout, Capture::Separate)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to spawn run command");
                return ExecutionOutcome {
                    stderr: format!("Failed to start command: {}", e),
                    failure_kind: FailureKind::RuntimeError,
                    ..Default::default()
                };
            }
        };

        let elapsed_seconds = raw.elapsed.as_secs_f64();

        if raw.timed_out {
            debug!(elapsed_ms = raw.elapsed.as_millis() as u64, "Run timed out");
            return ExecutionOutcome {
                // Partial output is kept only when it decodes cleanly
                stdout: String::from_utf8(raw.stdout).unwrap_or_default(),
                stderr: String::from_utf8(raw.stderr).unwrap_or_default(),
                failure_kind: FailureKind::TimedOut,
                elapsed_seconds,
                exit_code: None,
                diagnostic: Some(format!(
                    "Timeout expired in {} seconds",
                    timeout.as_secs_f64()
                )),
            };
        }

        match (String::from_utf8(raw.stdout), String::from_utf8(raw.stderr)) {
            (Ok(stdout), Ok(stderr)) => {
                let failure_kind = if stderr.is_empty() {
                    FailureKind::None
                } else {
                    FailureKind::RuntimeError
                };
                ExecutionOutcome {
                    stdout,
                    stderr,
                    failure_kind,
                    elapsed_seconds,
                    exit_code: raw.exit_code,
                    diagnostic: None,
                }
            }
            _ => ExecutionOutcome {
                stdout: String::new(),
                stderr: String::new(),
                failure_kind: FailureKind::DecodeError,
                elapsed_seconds,
                exit_code: raw.exit_code,
                diagnostic: Some(DECODE_ERROR_HINT.to_string()),
            },
        }
    }

    fn shell_command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .process_group(0)
            .kill_on_drop(true);
        cmd
    }

    /// Spawn `command`, write `input`, and wait at most `timeout` for it.
    /// Errors only when the process cannot be started at all.
    async fn run_with_timeout(
        &self,
        command: &str,
        input: &str,
        timeout: Duration,
        capture: Capture,
    ) -> io::Result<RawExecution> {
        let mut cmd = self.shell_command(command);

        // No input: stdin is closed so a blocking read sees EOF immediately
        if input.is_empty() {
            cmd.stdin(Stdio::null());
        } else {
            cmd.stdin(Stdio::piped());
        }

        let merged_reader = match capture {
            Capture::Separate => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
                None
            }
            Capture::Merged => {
                let (reader, writer) = io::pipe()?;
                cmd.stdout(writer.try_clone()?).stderr(writer);
                Some(reader)
            }
        };

        let start = Instant::now();
        let mut child = cmd.spawn()?;
        // The command holds write ends of the merged pipe until dropped
        drop(cmd);

        let pgid = child.id();
        debug!(pid = ?pgid, "Spawned process group");

        let stdin_task = child.stdin.take().map(|mut stdin| {
            let input = input.as_bytes().to_vec();
            tokio::spawn(async move {
                // A broken pipe only means the process stopped reading
                if let Err(e) = stdin.write_all(&input).await {
                    debug!(error = %e, "Input not fully consumed");
                }
                let _ = stdin.shutdown().await;
            })
        });

        let stdout_capture = match merged_reader {
            Some(reader) => {
                let receiver = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
                PipeCapture::spawn(Some(receiver))
            }
            None => PipeCapture::spawn(child.stdout.take()),
        };
        let stderr_capture = PipeCapture::spawn(child.stderr.take());

        let (status, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => (Some(status?), false),
            Err(_) => {
                kill_group(pgid);
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "Child already gone");
                }
                (child.wait().await.ok(), true)
            }
        };
        let elapsed = start.elapsed();

        kill_group(pgid);

        if let Some(task) = stdin_task {
            task.abort();
        }

        let (stdout, stderr) = tokio::join!(
            PipeCapture::drain(stdout_capture),
            PipeCapture::drain(stderr_capture)
        );

        Ok(RawExecution {
            stdout,
            stderr,
            exit_code: status.and_then(|s| s.code()),
            success: status.is_some_and(|s| s.success()),
            timed_out,
            elapsed,
        })
    }
}

/// Background reader whose bytes stay reachable even if the pipe never closes
struct PipeCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PipeCapture {
    fn spawn<R>(pipe: Option<R>) -> Option<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut pipe = pipe?;
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);

        let task = tokio::spawn(async move {
            let mut chunk = [0u8; READ_CHUNK_BYTES];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let mut buffer = sink.lock().unwrap_or_else(PoisonError::into_inner);
                        buffer.extend_from_slice(&chunk[..n]);
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!(error = %e, "Output pipe read failed");
                        break;
                    }
                }
            }
        });

        Some(Self { buffer, task })
    }

    /// Wait briefly for EOF, then return everything read so far
    async fn drain(capture: Option<Self>) -> Vec<u8> {
        let Some(mut capture) = capture else {
            return Vec::new();
        };

        if tokio::time::timeout(PIPE_DRAIN_GRACE, &mut capture.task).await.is_err() {
            warn!("Output pipe still open after process group was killed");
            capture.task.abort();
        }

        let mut buffer = capture.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *buffer)
    }
}

fn kill_group(pgid: Option<u32>) {
    let Some(pid) = pgid else { return };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid = pid, error = %e, "Failed to kill process group"),
    }
}
