//! Compiler driver
//!
//! Runs the invocations built by a [`Toolchain`] and turns their exit status
//! into compile and link errors carrying the tool output verbatim.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use super::command_logger::{CommandOutput, LogCallback, run_command_capture};
use super::job::{CompileJob, LinkJob};
use crate::toolchain::Toolchain;
use crate::{Error, Result};

/// Runs compile and link jobs for a project
#[derive(Clone)]
pub struct CompilerDriver {
    /// Working directory of every tool invocation
    root: Utf8PathBuf,
    /// Ceiling for a single invocation
    timeout: Option<Duration>,
    log_callback: Option<LogCallback>,
}

impl std::fmt::Debug for CompilerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerDriver")
            .field("root", &self.root)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CompilerDriver {
    /// Create a driver running tools from the project root
    pub fn new(root: &Utf8Path) -> Self {
        Self {
            root: root.to_path_buf(),
            timeout: None,
            log_callback: None,
        }
    }

    /// Kill invocations that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Forward every output line to `callback`
    pub fn with_log_callback(mut self, callback: LogCallback) -> Self {
        self.log_callback = Some(callback);
        self
    }

    /// Compile one source file.
    ///
    /// Fails with `CompilerInvocation` when the compiler cannot run, times out
    /// or exits with a nonzero status, and with `UnsupportedOption` when the
    /// toolchain cannot express the job's options.
    pub async fn compile(&self, toolchain: &dyn Toolchain, job: &CompileJob) -> Result<CommandOutput> {
        let invocation = toolchain.compile_invocation(job)?;
        if let Some(parent) = job.object.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut output = run_command_capture(
            &invocation,
            &self.root,
            &job.target,
            self.timeout,
            self.log_callback.clone(),
        )
        .await
        .map_err(|e| Error::CompilerInvocation {
            source_file: job.source.clone(),
            diagnostics: e.to_string(),
        })?;

        if !output.success {
            return Err(Error::CompilerInvocation {
                source_file: job.source.clone(),
                diagnostics: output.diagnostics(),
            });
        }

        toolchain.capture_header_dependencies(job, &mut output)?;
        tracing::debug!(name = %job.target, "Compiled {}", job.source);
        Ok(output)
    }

    /// Link (or archive) a target's objects into its artifact.
    ///
    /// Any previous artifact is removed first so that archivers never append
    /// to stale members.
    pub async fn link(&self, toolchain: &dyn Toolchain, job: &LinkJob) -> Result<Utf8PathBuf> {
        let link_error = |diagnostics: String| Error::Link {
            target: job.target.clone(),
            diagnostics,
        };

        let invocation = toolchain.link_invocation(job)?;
        if let Some(parent) = job.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(&job.output) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let output = run_command_capture(
            &invocation,
            &self.root,
            &job.target,
            self.timeout,
            self.log_callback.clone(),
        )
        .await
        .map_err(|e| link_error(e.to_string()))?;

        if !output.success {
            return Err(link_error(output.diagnostics()));
        }
        if !job.output.exists() {
            return Err(link_error(format!(
                "{} exited successfully but did not produce {}",
                invocation.program, job.output
            )));
        }

        Ok(job.output.clone())
    }
}
