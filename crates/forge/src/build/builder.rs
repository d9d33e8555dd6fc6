//! Build orchestration
//!
//! This module provides the main build orchestration logic that:
//! - Selects the targets to build and their dependencies
//! - Reports the build plan for dry runs
//! - Wires the change detector, compiler driver and progress display into
//!   the parallel executor

use std::sync::Arc;

use crate::Result;
use crate::project::Project;
use crate::stale::{ChangeDetector, Staleness};
use crate::state::{FileStateStore, StateStore};
use crate::toolchain::OptLevel;

use super::parallel::ParallelExecutor;
use super::progress::BuildProgress;
use super::report::BuildReport;

/// Arguments for the build operation
#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
    /// Build specific targets (and their dependencies) only
    pub targets: Option<Vec<String>>,
    /// Number of parallel jobs
    pub jobs: Option<usize>,
    /// Dry run - show what would be built
    pub dry_run: bool,
    /// Rebuild every selected target
    pub force_rebuild: bool,
    /// Build every target with `optimization = "fast"`
    pub fast: bool,
    /// Do not draw progress bars
    pub quiet: bool,
}

/// Main builder for forge projects
pub struct Builder<'a> {
    project: &'a Project,
    store: Arc<dyn StateStore>,
}

impl<'a> Builder<'a> {
    /// Create a builder persisting state under the project's state directory
    pub fn new(project: &'a Project) -> Self {
        Self {
            project,
            store: Arc::new(FileStateStore::new(&project.state_dir())),
        }
    }

    /// Use another state store
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    fn executor(&self, args: &BuildArgs) -> ParallelExecutor<'a> {
        let jobs = args
            .jobs
            .filter(|jobs| *jobs > 0)
            .unwrap_or_else(|| self.project.config.effective_jobs());
        let cache = self.project.config.build.cache;
        let detector = ChangeDetector::new(Arc::clone(&self.store)).with_force(args.force_rebuild || !cache);

        ParallelExecutor::new(self.project, detector, jobs)
            .with_optimization(args.fast.then_some(OptLevel::Fast))
    }

    /// Staleness of every selected target, in build order
    pub fn plan(&self, args: &BuildArgs) -> Result<Vec<(String, Staleness)>> {
        let targets = self.project.selection(args.targets.as_deref())?;
        self.executor(args).plan(&targets)
    }

    /// Execute the build
    pub fn build(&self, args: &BuildArgs) -> Result<BuildReport> {
        tracing::info!("Building project at {}", self.project.root);

        let targets = self.project.selection(args.targets.as_deref())?;
        if targets.is_empty() {
            tracing::warn!("No targets to build");
            return Ok(BuildReport::default());
        }

        tracing::debug!("Build order: {:?}", targets);

        if args.dry_run {
            println!("Would build the following targets in order:");
            for (name, staleness) in self.plan(args)? {
                match staleness {
                    Staleness::UpToDate => println!("  - {} (up to date)", name),
                    Staleness::Stale(reason) => println!("  - {} ({})", name, reason),
                }
            }
            return Ok(BuildReport::default());
        }

        std::fs::create_dir_all(self.project.build_dir())?;

        let executor = self.executor(args);
        let mut progress = if args.quiet {
            BuildProgress::hidden(targets.len())
        } else {
            BuildProgress::new(targets.len())
        };

        let report = executor.execute(targets, &mut progress)?;

        tracing::info!("Build finished: {}", report.summary());
        Ok(report)
    }
}
