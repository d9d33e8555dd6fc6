//! Parallel execution for target builds
//!
//! This module provides parallel build execution that respects target
//! dependencies, building independent targets concurrently. Compile jobs of
//! every running target share one pool of `jobs` slots.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use crate::project::Project;
use crate::source::{SourceFile, option_fingerprint};
use crate::stale::{ChangeDetector, Staleness};
use crate::state::{BuildStatus, TargetRecord};
use crate::target::Target;
use crate::toolchain::OptLevel;
use crate::{Error, Result};

use super::command_logger::CommandOutput;
use super::driver::CompilerDriver;
use super::job::{CompileJob, LinkJob, object_path};
use super::progress::{BuildProgress, TargetPhase};
use super::report::{BuildOutcome, BuildReport, BuildResult};

/// Messages from target tasks to the scheduling loop
#[derive(Debug)]
enum Event {
    Phase { target: String, phase: TargetPhase },
    Log { target: String, line: String },
}

/// What a finished target task hands back to the scheduling loop
#[derive(Debug)]
struct Completion {
    target: String,
    outcome: BuildOutcome,
    artifact: Option<Utf8PathBuf>,
    compiled: usize,
    duration: Duration,
    /// State to persist; `None` leaves the previous record in place
    record: Option<TargetRecord>,
}

impl Completion {
    fn failed(target: String, diagnostics: String, started: Instant) -> Self {
        Self {
            target,
            outcome: BuildOutcome::Failure { diagnostics },
            artifact: None,
            compiled: 0,
            duration: started.elapsed(),
            record: None,
        }
    }
}

/// Execute parallel builds for targets
pub struct ParallelExecutor<'a> {
    project: &'a Project,
    detector: ChangeDetector,
    driver: CompilerDriver,
    jobs: usize,
    optimization: Option<OptLevel>,
}

impl<'a> ParallelExecutor<'a> {
    /// Create a new parallel executor
    pub fn new(project: &'a Project, detector: ChangeDetector, jobs: usize) -> Self {
        let driver = CompilerDriver::new(&project.root)
            .with_timeout(project.config.build.compile_timeout.map(Duration::from_secs));
        Self {
            project,
            detector,
            driver,
            jobs: jobs.max(1),
            optimization: None,
        }
    }

    /// Override the optimization level of every target
    pub fn with_optimization(mut self, level: Option<OptLevel>) -> Self {
        self.optimization = level;
        self
    }

    /// Execute builds for the given targets, stopping on Ctrl-C.
    ///
    /// `targets` must be in build order and closed under dependencies.
    pub fn execute(&self, targets: Vec<String>, progress: &mut BuildProgress) -> Result<BuildReport> {
        // Create tokio runtime for async execution
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.jobs)
            .enable_all()
            .build()
            .map_err(|e| Error::build(format!("Failed to create async runtime: {}", e), ""))?;

        rt.block_on(self.execute_until(targets, progress, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }))
    }

    /// Execute builds until every target is done or `shutdown` completes.
    ///
    /// On shutdown all running tasks are aborted, killing their compiler
    /// processes, and `Error::Interrupted` is returned. Targets finished
    /// before that have already been recorded.
    pub async fn execute_until<F>(
        &self,
        targets: Vec<String>,
        progress: &mut BuildProgress,
        shutdown: F,
    ) -> Result<BuildReport>
    where
        F: Future<Output = ()>,
    {
        let selected: HashSet<&str> = targets.iter().map(String::as_str).collect();

        // 1. Build Dependency Graph
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        let mut in_degree: HashMap<String, usize> = HashMap::new();
        for name in &targets {
            let target = self.project.target(name)?;
            let mut degree = 0;
            for dep in &target.deps {
                if selected.contains(dep.as_str()) {
                    degree += 1;
                    dependents.entry(dep.clone()).or_default().push(name.clone());
                }
            }
            in_degree.insert(name.clone(), degree);
        }

        // 2. Initialize Queue with targets that have 0 dependencies in the set
        let mut queue: VecDeque<String> = targets
            .iter()
            .filter(|name| in_degree.get(*name) == Some(&0))
            .cloned()
            .collect();

        let mut phases: HashMap<String, TargetPhase> = targets
            .iter()
            .map(|name| (name.clone(), TargetPhase::Pending))
            .collect();

        // 3. Execution Loop
        let (tx, mut rx) = mpsc::unbounded_channel();
        let compile_slots = Arc::new(Semaphore::new(self.jobs));
        let mut tasks = JoinSet::new();
        let mut results: HashMap<String, BuildResult> = HashMap::new();
        let mut rebuilt: HashSet<String> = HashSet::new();
        tokio::pin!(shutdown);

        while results.len() < targets.len() {
            // Schedule new targets up to limit
            while tasks.len() < self.jobs {
                let Some(name) = queue.pop_front() else {
                    break;
                };
                if results.contains_key(&name) {
                    continue;
                }

                let task = self.target_task(&name, &rebuilt, &compile_slots, &tx)?;
                tasks.spawn(supervise(name.clone(), run_target(task)));
                self.transition(&mut phases, progress, &name, TargetPhase::Scheduled);
            }

            // Check for deadlock
            if tasks.is_empty() {
                return Err(Error::build(
                    "Build deadlocked: targets remain but none are ready to build.",
                    "This indicates a circular dependency or a bug in dependency resolution.",
                ));
            }

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::warn!("Interrupted, stopping {} running targets", tasks.len());
                    tasks.shutdown().await;
                    return Err(Error::Interrupted);
                }

                Some(event) = rx.recv() => match event {
                    Event::Phase { target, phase } => {
                        if !results.contains_key(&target) {
                            self.transition(&mut phases, progress, &target, phase);
                        }
                    }
                    Event::Log { target, line } => progress.update_target_log(&target, &line),
                },

                Some(joined) = tasks.join_next() => {
                    let completion = joined.map_err(|e| {
                        Error::build(
                            format!("Build task stopped unexpectedly: {}", e),
                            "This is likely a bug in forge",
                        )
                    })?;
                    let name = completion.target.clone();
                    phases.insert(name.clone(), TargetPhase::Done);

                    if let Some(record) = &completion.record {
                        if let Err(e) = self.detector.commit(&name, record) {
                            tracing::warn!("Failed to record build state of {}: {}", name, e);
                        }
                    }

                    match &completion.outcome {
                        BuildOutcome::Success | BuildOutcome::UpToDate => {
                            if completion.outcome == BuildOutcome::Success {
                                tracing::info!("Built {} in {:.2}s", name, completion.duration.as_secs_f64());
                                rebuilt.insert(name.clone());
                            } else {
                                tracing::info!("{} is up to date", name);
                            }

                            // Unlock dependents
                            for dependent in dependents.get(&name).into_iter().flatten() {
                                if let Some(degree) = in_degree.get_mut(dependent) {
                                    *degree -= 1;
                                    if *degree == 0 {
                                        queue.push_back(dependent.clone());
                                    }
                                }
                            }
                        }
                        BuildOutcome::Failure { diagnostics } => {
                            progress.suspend(|| {
                                tracing::error!("Failed to build {}:\n{}", name, diagnostics.trim_end());
                            });
                            for dependent in self.project.graph.transitive_dependents(&name)? {
                                if !selected.contains(dependent.name.as_str())
                                    || results.contains_key(&dependent.name)
                                {
                                    continue;
                                }
                                tracing::warn!("Skipping {}: dependency {} failed", dependent.name, name);
                                let outcome = BuildOutcome::DependencyFailed { dependency: name.clone() };
                                phases.insert(dependent.name.clone(), TargetPhase::Done);
                                progress.finish_target(&dependent.name, &outcome);
                                results.insert(
                                    dependent.name.clone(),
                                    BuildResult {
                                        target: dependent.name.clone(),
                                        outcome,
                                        artifact: None,
                                        compiled: 0,
                                        duration: Duration::ZERO,
                                    },
                                );
                            }
                        }
                        BuildOutcome::DependencyFailed { .. } => {}
                    }

                    progress.finish_target(&name, &completion.outcome);
                    results.insert(
                        name.clone(),
                        BuildResult {
                            target: name,
                            outcome: completion.outcome,
                            artifact: completion.artifact,
                            compiled: completion.compiled,
                            duration: completion.duration,
                        },
                    );
                }
            }
        }

        progress.finish();

        Ok(BuildReport {
            results: targets
                .iter()
                .filter_map(|name| results.remove(name))
                .collect(),
        })
    }

    /// Staleness of each target without building anything.
    ///
    /// A stale target is assumed to be rebuilt, so its dependents are
    /// reported stale as well.
    pub fn plan(&self, targets: &[String]) -> Result<Vec<(String, Staleness)>> {
        let mut will_rebuild = HashSet::new();
        let mut plan = Vec::with_capacity(targets.len());

        for name in targets {
            let target = self.prepared_target(name)?;
            let prepared = prepare(&target, &self.project.root, &self.project.object_dir(name))?;
            let staleness =
                self.detector
                    .check(&target, &prepared.sources, &prepared.option_fingerprint, &will_rebuild);
            if staleness.is_stale() {
                will_rebuild.insert(name.clone());
            }
            plan.push((name.clone(), staleness));
        }

        Ok(plan)
    }

    fn transition(
        &self,
        phases: &mut HashMap<String, TargetPhase>,
        progress: &mut BuildProgress,
        target: &str,
        phase: TargetPhase,
    ) {
        let previous = phases.insert(target.to_string(), phase);
        tracing::debug!(name = target, from = ?previous, to = ?phase, "Target phase");
        progress.set_phase(target, phase);
    }

    /// The target as it will be built in this run
    fn prepared_target(&self, name: &str) -> Result<Target> {
        let mut target = self.project.target(name)?.clone();
        if let Some(level) = self.optimization {
            target.options.optimization = Some(level);
        }
        Ok(target)
    }

    /// Everything one target task needs, owned
    fn target_task(
        &self,
        name: &str,
        rebuilt: &HashSet<String>,
        compile_slots: &Arc<Semaphore>,
        events: &mpsc::UnboundedSender<Event>,
    ) -> Result<TargetTask> {
        let target = self.prepared_target(name)?;

        // Dependents first, so that single-pass linkers resolve every symbol
        let libraries = self
            .project
            .graph
            .transitive_dependencies(name)?
            .into_iter()
            .filter_map(|dep| dep.toolchain.link_input(&dep.output, dep.kind))
            .collect();

        let rebuilt_dependencies = target
            .deps
            .iter()
            .filter(|dep| rebuilt.contains(*dep))
            .cloned()
            .collect();

        let log_events = events.clone();
        let log_target = name.to_string();
        let driver = self.driver.clone().with_log_callback(Arc::new(move |line: &str| {
            let _ = log_events.send(Event::Log {
                target: log_target.clone(),
                line: line.to_string(),
            });
        }));

        Ok(TargetTask {
            object_dir: self.project.object_dir(name),
            root: self.project.root.clone(),
            target,
            libraries,
            rebuilt_dependencies,
            detector: self.detector.clone(),
            driver,
            compile_slots: Arc::clone(compile_slots),
            events: events.clone(),
        })
    }
}

/// Context for building a single target
struct TargetTask {
    target: Target,
    root: Utf8PathBuf,
    object_dir: Utf8PathBuf,
    libraries: Vec<Utf8PathBuf>,
    rebuilt_dependencies: HashSet<String>,
    detector: ChangeDetector,
    driver: CompilerDriver,
    compile_slots: Arc<Semaphore>,
    events: mpsc::UnboundedSender<Event>,
}

impl TargetTask {
    fn phase(&self, phase: TargetPhase) {
        let _ = self.events.send(Event::Phase {
            target: self.target.name.clone(),
            phase,
        });
    }
}

/// Compile jobs and fingerprints of a target, as of the start of the run
struct Prepared {
    jobs: Vec<CompileJob>,
    sources: Vec<SourceFile>,
    option_fingerprint: String,
}

fn prepare(target: &Target, root: &Utf8Path, object_dir: &Utf8Path) -> Result<Prepared> {
    let option_fingerprint = option_fingerprint(target)?;
    let mut jobs = Vec::with_capacity(target.sources.len());
    let mut sources = Vec::with_capacity(target.sources.len());

    for source in &target.sources {
        let object = object_path(root, object_dir, source, target.toolchain.object_extension());
        let job = CompileJob::new(
            &target.name,
            target.kind,
            source.clone(),
            object,
            target.options.clone(),
        );
        let headers = target.toolchain.discover_header_dependencies(&job)?;
        sources.push(SourceFile::scan(root, source, &headers)?);
        jobs.push(job);
    }

    Ok(Prepared {
        jobs,
        sources,
        option_fingerprint,
    })
}

/// Run a target's build, turning a panic into a failure of that target.
///
/// The build runs in its own `JoinSet` so that aborting the supervisor also
/// aborts the build and kills its compilers.
async fn supervise<F>(name: String, build: F) -> Completion
where
    F: Future<Output = Completion> + Send + 'static,
{
    let started = Instant::now();
    let mut inner = JoinSet::new();
    inner.spawn(build);
    match inner.join_next().await {
        Some(Ok(completion)) => completion,
        Some(Err(e)) => Completion::failed(name, format!("Build task panicked: {}", e), started),
        None => Completion::failed(name, "Build task was never started".to_string(), started),
    }
}

async fn run_target(task: TargetTask) -> Completion {
    let started = Instant::now();
    let name = task.target.name.clone();

    // 1. Fingerprint sources and headers
    let prepared = tokio::task::spawn_blocking({
        let target = task.target.clone();
        let root = task.root.clone();
        let object_dir = task.object_dir.clone();
        move || prepare(&target, &root, &object_dir)
    })
    .await;
    let mut prepared = match prepared {
        Ok(Ok(prepared)) => prepared,
        Ok(Err(e)) => return Completion::failed(name, e.to_string(), started),
        Err(e) => return Completion::failed(name, format!("Task panicked: {}", e), started),
    };

    // 2. Check build state
    let staleness = task.detector.check(
        &task.target,
        &prepared.sources,
        &prepared.option_fingerprint,
        &task.rebuilt_dependencies,
    );
    let reason = match staleness {
        Staleness::UpToDate => {
            return Completion {
                target: name,
                outcome: BuildOutcome::UpToDate,
                artifact: Some(task.target.output.clone()),
                compiled: 0,
                duration: started.elapsed(),
                record: None,
            };
        }
        Staleness::Stale(reason) => reason,
    };
    tracing::info!("Building {} ({}): {}", name, task.target.kind, reason);

    // Dependencies are recorded before their dependents are scheduled
    let dependencies = task.detector.dependency_fingerprints(&task.target);
    let failed_record = |sources: &[SourceFile]| {
        TargetRecord::new(
            sources,
            &prepared.option_fingerprint,
            dependencies.clone(),
            &task.target.output,
            BuildStatus::Failed,
        )
    };

    // Options the toolchain cannot express fail the target once, not per source
    if let Err(e) = task.target.toolchain.compile_flags(&task.target.options) {
        let mut completion = Completion::failed(name, e.to_string(), started);
        completion.record = Some(failed_record(&prepared.sources));
        return completion;
    }

    // 3. Compile every source, each into its own result slot
    task.phase(TargetPhase::Compiling);
    let mut compiles = JoinSet::new();
    for (index, job) in prepared.jobs.iter().cloned().enumerate() {
        let slots = Arc::clone(&task.compile_slots);
        let driver = task.driver.clone();
        let toolchain = Arc::clone(&task.target.toolchain);
        compiles.spawn(async move {
            let result = match slots.acquire_owned().await {
                Ok(_permit) => driver.compile(toolchain.as_ref(), &job).await,
                Err(_) => Err(Error::Interrupted),
            };
            (index, result)
        });
    }

    let mut slots: Vec<Option<Result<CommandOutput>>> = prepared.jobs.iter().map(|_| None).collect();
    let mut diagnostics = Vec::new();
    while let Some(joined) = compiles.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => diagnostics.push(format!("Compile task panicked: {}", e)),
        }
    }

    // 4. Merge the slots in source order
    let mut compiled = 0;
    for (index, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(Ok(_)) => {
                compiled += 1;
                let job = &prepared.jobs[index];
                match task.target.toolchain.discover_header_dependencies(job) {
                    Ok(headers) => prepared.sources[index].refresh_headers(&task.root, &headers),
                    Err(e) => tracing::warn!("Cannot read dependencies of {}: {}", job.source, e),
                }
            }
            Some(Err(e)) => diagnostics.push(e.diagnostic_text()),
            None => {}
        }
    }

    if !diagnostics.is_empty() {
        return Completion {
            target: name,
            outcome: BuildOutcome::Failure {
                diagnostics: diagnostics.join("\n"),
            },
            artifact: None,
            compiled,
            duration: started.elapsed(),
            record: Some(failed_record(&prepared.sources)),
        };
    }

    // 5. Link
    task.phase(TargetPhase::Linking);
    let link = LinkJob {
        target: name.clone(),
        kind: task.target.kind,
        objects: prepared.jobs.iter().map(|job| job.object.clone()).collect(),
        libraries: task.libraries.clone(),
        output: task.target.output.clone(),
        options: task.target.options.clone(),
    };
    let linked = match Arc::clone(&task.compile_slots).acquire_owned().await {
        Ok(_permit) => task.driver.link(task.target.toolchain.as_ref(), &link).await,
        Err(_) => Err(Error::Interrupted),
    };

    match linked {
        Ok(artifact) => Completion {
            record: Some(TargetRecord::new(
                &prepared.sources,
                &prepared.option_fingerprint,
                dependencies.clone(),
                &artifact,
                BuildStatus::Success,
            )),
            target: name,
            outcome: BuildOutcome::Success,
            artifact: Some(artifact),
            compiled,
            duration: started.elapsed(),
        },
        Err(e) => Completion {
            target: name,
            outcome: BuildOutcome::Failure {
                diagnostics: e.diagnostic_text(),
            },
            artifact: None,
            compiled,
            duration: started.elapsed(),
            record: Some(failed_record(&prepared.sources)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explode() -> Completion {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_supervise_names_panicked_target() {
        let completion = supervise("net".to_string(), async { explode() }).await;

        assert_eq!(completion.target, "net");
        match completion.outcome {
            BuildOutcome::Failure { diagnostics } => assert!(diagnostics.contains("panicked")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(completion.record.is_none());
    }

    #[tokio::test]
    async fn test_supervise_passes_completion_through() {
        let completion = supervise("core".to_string(), async {
            Completion {
                target: "core".to_string(),
                outcome: BuildOutcome::UpToDate,
                artifact: None,
                compiled: 0,
                duration: Duration::ZERO,
                record: None,
            }
        })
        .await;

        assert_eq!(completion.outcome, BuildOutcome::UpToDate);
    }
}
