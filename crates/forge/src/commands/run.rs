//! Run command implementation
//!
//! Builds an executable target and runs it.

use std::process::{ExitCode, ExitStatus};

use crate::build::{BuildArgs, Builder};
use crate::project::Project;
use crate::target::TargetKind;
use camino::Utf8Path;
use clap::Args;
use miette::{IntoDiagnostic, Result};

/// Arguments for the run command
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Executable target to run (default: the first declared executable)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Arguments passed to the program
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Run the run command, returning the program's exit status
pub fn run(project_root: &Utf8Path, args: RunArgs) -> Result<ExitCode> {
    let project = Project::load(project_root).into_diagnostic()?;

    let target = match &args.target {
        Some(name) => project.target(name).into_diagnostic()?,
        None => project
            .default_executable()
            .ok_or_else(|| miette::miette!("The project declares no executable target"))?,
    };
    if target.kind != TargetKind::Executable {
        return Err(miette::miette!(
            "Target {} is a {}, not an executable",
            target.name,
            target.kind
        ));
    }

    let build_args = BuildArgs {
        targets: Some(vec![target.name.clone()]),
        jobs: args.jobs,
        ..Default::default()
    };
    let report = Builder::new(&project).build(&build_args).into_diagnostic()?;
    super::build::ensure_success(&report)?;

    tracing::info!("Running {}", target.output);
    let status = std::process::Command::new(&target.output)
        .args(&args.args)
        .current_dir(&project.root)
        .status()
        .into_diagnostic()?;

    Ok(ExitCode::from(exit_code(status)))
}

/// Exit code to forward for a finished program; 1 when it was killed by a
/// signal or returned a code outside `0..=255`
fn exit_code(status: ExitStatus) -> u8 {
    status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or(1)
}
