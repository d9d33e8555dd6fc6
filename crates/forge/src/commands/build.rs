//! Build command implementation
//!
//! This module provides the CLI interface for building targets.

use crate::build::{BuildArgs as CoreBuildArgs, BuildOutcome, BuildReport, Builder};
use crate::project::Project;
use camino::Utf8Path;
use clap::Args;
use miette::{IntoDiagnostic, Result};

/// Arguments for the build command
#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Build specific targets (and their dependencies) only
    #[arg(short, long = "target")]
    pub targets: Option<Vec<String>>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Dry run - show what would be built
    #[arg(long)]
    pub dry_run: bool,

    /// Force rebuild even if build state is valid
    #[arg(long)]
    pub force_rebuild: bool,

    /// Build with the fastest optimization level
    #[arg(long)]
    pub fast: bool,
}

impl From<BuildArgs> for CoreBuildArgs {
    fn from(args: BuildArgs) -> Self {
        CoreBuildArgs {
            targets: args.targets,
            jobs: args.jobs,
            dry_run: args.dry_run,
            force_rebuild: args.force_rebuild,
            fast: args.fast,
            quiet: false,
        }
    }
}

/// Run the build command
pub fn run(project_root: &Utf8Path, args: BuildArgs) -> Result<()> {
    let project = Project::load(project_root).into_diagnostic()?;
    let core_args: CoreBuildArgs = args.into();

    let report = Builder::new(&project).build(&core_args).into_diagnostic()?;
    ensure_success(&report)
}

/// Print the per-target summary and fail when any target failed
pub(crate) fn ensure_success(report: &BuildReport) -> Result<()> {
    for result in &report.results {
        println!("{:>12}  {}", result.outcome.to_string(), result.target);
    }

    for result in report.failures() {
        if let BuildOutcome::Failure { diagnostics } = &result.outcome {
            eprintln!("\nerror: {} failed:\n{}", result.target, diagnostics.trim_end());
        }
    }

    if report.is_success() {
        Ok(())
    } else {
        let (_, _, failed, skipped) = report.counts();
        Err(miette::miette!(
            "Build failed: {} target(s) failed, {} skipped",
            failed,
            skipped
        ))
    }
}
