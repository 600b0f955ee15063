use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::config::ToolsConfig;
use crate::executor::{
    CommandCall, CommandError, CommandRequest, CommandResult, Operation, RawOutput, captured_text,
};
use crate::interpret::interpret;

const READ_CHUNK: usize = 8 * 1024;

/// Spawns one child per request with a discrete argument vector (no shell),
/// bounds it by the request timeout, and reaps it on every exit path.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    context_flag: String,
    namespace_flag: String,
    max_stdout_bytes: usize,
    max_stderr_bytes: usize,
}

impl ProcessRunner {
    #[must_use]
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            context_flag: config.kubectl.context_flag.clone(),
            namespace_flag: config.kubectl.namespace_flag.clone(),
            max_stdout_bytes: config.max_stdout_bytes,
            max_stderr_bytes: config.max_stderr_bytes,
        }
    }

    /// Argument vector passed to the child, excluding the program itself.
    ///
    /// Scope flags go first so they can never land after a `--` separator.
    #[must_use]
    pub fn argv(&self, request: &CommandRequest) -> Vec<String> {
        let mut argv = Vec::with_capacity(request.args().len() + 4);
        if let Some(context) = request.context() {
            argv.push(self.context_flag.clone());
            argv.push(context.to_owned());
        }
        if let Some(namespace) = request.namespace() {
            argv.push(self.namespace_flag.clone());
            argv.push(namespace.to_owned());
        }
        argv.extend(request.args().iter().cloned());
        argv
    }

    /// Run the request to completion.
    ///
    /// # Errors
    ///
    /// Returns `not-found` when the program is missing, `timed-out` when the
    /// deadline passes (the child is killed and its partial output dropped),
    /// and `process-failed` on a nonzero exit or any other spawn/wait failure.
    pub async fn run(&self, request: &CommandRequest) -> Result<RawOutput, CommandError> {
        let program = request.program();
        tracing::debug!(
            program,
            argc = request.args().len(),
            timeout_ms = request.timeout().as_millis(),
            "spawning command"
        );

        let mut command = Command::new(program);
        command
            .args(self.argv(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own group, so grandchildren can be taken down with the child
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(program, "program not found");
                return Err(CommandError::not_found(program));
            }
            Err(e) => {
                tracing::warn!(program, "spawn failed: {e}");
                return Err(CommandError::spawn_failed(program, &e));
            }
        };

        // id() is gone once the child has been waited on
        let group = child.id();
        let start = Instant::now();
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            terminate(&mut child, group, program).await;
            return Err(CommandError::spawn_failed(
                program,
                &std::io::Error::other("child pipes unavailable"),
            ));
        };

        let max_stdout = self.max_stdout_bytes;
        let max_stderr = self.max_stderr_bytes;
        let collect = async {
            let (out, err) = tokio::join!(
                read_capped(stdout, max_stdout),
                read_capped(stderr, max_stderr)
            );
            let status = child.wait().await;
            (out, err, status)
        };
        let outcome = tokio::time::timeout(request.timeout(), collect).await;

        let Ok((out, err, status)) = outcome else {
            terminate(&mut child, group, program).await;
            tracing::warn!(program, timeout_ms = request.timeout().as_millis(), "command timed out");
            return Err(CommandError::timed_out(program, request.timeout()));
        };
        let elapsed = start.elapsed();
        // the child exited, but anything it left in the background must not outlive the call
        kill_group(group, program);

        let status = status.map_err(|e| CommandError::spawn_failed(program, &e))?;
        let out = out.map_err(|e| CommandError::spawn_failed(program, &e))?;
        let err = err.map_err(|e| CommandError::spawn_failed(program, &e))?;
        let stderr = captured_text(&err.bytes, err.dropped);

        if !status.success() {
            tracing::warn!(program, exit_code = ?status.code(), "command failed");
            return Err(CommandError::process_failed(program, status.code(), stderr));
        }

        tracing::debug!(
            program,
            elapsed_ms = elapsed.as_millis(),
            stdout_bytes = out.bytes.len() + out.dropped,
            "command finished"
        );
        if out.dropped > 0 {
            tracing::warn!(program, dropped = out.dropped, "stdout exceeded capture cap");
        }

        Ok(RawOutput {
            exit_code: status.code().unwrap_or(0),
            stdout: String::from_utf8_lossy(&out.bytes).into_owned(),
            stderr,
            elapsed,
            stdout_truncated: out.dropped > 0,
        })
    }
}

/// The process runner followed by the output interpreter, as an [`Operation`].
#[derive(Debug, Clone)]
pub struct CommandRunner {
    runner: ProcessRunner,
}

impl CommandRunner {
    #[must_use]
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }
}

impl Operation for CommandRunner {
    type Args = CommandCall;
    type Output = CommandResult;

    async fn call(&self, call: CommandCall) -> Result<CommandResult, CommandError> {
        let raw = self.runner.run(&call.request).await?;
        interpret(raw, call.request.decode())
    }
}

/// SIGKILL the child's process group, then kill and reap the child itself.
async fn terminate(child: &mut Child, group: Option<u32>, program: &str) {
    kill_group(group, program);
    // kill() waits after signalling, so the child is reaped here
    if let Err(e) = child.kill().await {
        tracing::warn!(program, "failed to kill child: {e}");
    }
}

/// SIGKILL every process left in the group led by the child.
fn kill_group(group: Option<u32>, program: &str) {
    #[cfg(unix)]
    if let Some(pid) = group.and_then(|id| i32::try_from(id).ok()) {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            // group already empty
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::debug!(program, pid, error = ?e, "killpg failed"),
        }
    }
    #[cfg(not(unix))]
    let _ = (group, program);
}

struct Captured {
    bytes: Vec<u8>,
    dropped: usize,
}

/// Read the stream to EOF, keeping at most `cap` bytes. The rest is drained
/// so the child never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> std::io::Result<Captured> {
    let mut bytes = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = cap.saturating_sub(bytes.len());
        let keep = n.min(room);
        bytes.extend_from_slice(&chunk[..keep]);
        dropped += n - keep;
    }
    Ok(Captured { bytes, dropped })
}
