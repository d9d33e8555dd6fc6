//! Command execution with log capture
//!
//! This module runs compiler and linker commands while capturing their
//! output. Each line is logged through tracing and may be forwarded to a
//! callback for progress display; the full text is kept so that failures can
//! be reported verbatim.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::toolchain::Invocation;
use crate::{Error, Result};

/// Callback for log lines
pub type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited successfully
    pub success: bool,
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl CommandOutput {
    /// Diagnostic text: stderr followed by stdout (cl.exe reports errors on
    /// stdout)
    pub fn diagnostics(&self) -> String {
        let mut text = self.stderr.clone();
        if !self.stdout.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stdout);
        }
        text
    }
}

/// Run an invocation in `cwd` and capture its output.
///
/// Stdout lines are logged at debug level, stderr lines at warn level. When
/// `timeout` elapses the process is killed and an error is returned. The
/// process is also killed if the returned future is dropped.
pub async fn run_command_capture(
    invocation: &Invocation,
    cwd: &Utf8Path,
    target: &str,
    timeout: Option<Duration>,
    log_callback: Option<LogCallback>,
) -> Result<CommandOutput> {
    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!("Running command: {}", invocation);

    let mut child = command.spawn().map_err(|e| {
        Error::build(
            format!("Failed to start {} for {}: {}", invocation.program, target, e),
            "Check that the program is installed and on PATH (see `forge check`)",
        )
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::build("Failed to capture stdout", ""))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::build("Failed to capture stderr", ""))?;

    let stdout_handle = capture_lines(stdout, target, false, log_callback.clone());
    let stderr_handle = capture_lines(stderr, target, true, log_callback);

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                let _ = child.kill().await;
                stdout_handle.abort();
                stderr_handle.abort();
                return Err(Error::build(
                    format!(
                        "{} timed out after {}s for {}",
                        invocation.program,
                        limit.as_secs(),
                        target
                    ),
                    "Raise build.compile_timeout in forge.toml",
                ));
            }
        },
        None => child.wait().await,
    }
    .map_err(|e| Error::build(format!("{} failed for {}", invocation.program, target), e.to_string()))?;

    let stdout = stdout_handle.await.unwrap_or_default();
    let stderr = stderr_handle.await.unwrap_or_default();

    Ok(CommandOutput {
        success: status.success(),
        code: status.code(),
        stdout,
        stderr,
    })
}

/// Read a pipe line by line until it closes, returning everything read.
///
/// Compilers do not always write UTF-8 (localized messages, console code
/// pages), so invalid sequences are replaced rather than ending the capture.
fn capture_lines<R>(
    pipe: R,
    target: &str,
    is_stderr: bool,
    log_callback: Option<LogCallback>,
) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let target = target.to_string();
    tokio::spawn(async move {
        let mut captured = String::new();
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(name = %target, "Stopped reading command output: {}", e);
                    break;
                }
            }
            let text = String::from_utf8_lossy(&buf);
            let line = text.trim_end_matches(['\n', '\r']);

            if is_stderr {
                tracing::warn!(target: "build_output", name = %target, "{}", line);
            } else {
                tracing::debug!(target: "build_output", name = %target, "{}", line);
            }

            if let Some(ref callback) = log_callback {
                callback(line);
            }

            captured.push_str(line);
            captured.push('\n');
        }
        captured
    })
}
