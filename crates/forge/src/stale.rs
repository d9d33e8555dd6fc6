//! Change detection
//!
//! The [`ChangeDetector`] compares the fingerprints of a target's inputs with
//! the record of its last build. It is the only component that reads or
//! writes build state; the orchestrator commits a record once a target's
//! outcome is final.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::Result;
use crate::source::SourceFile;
use crate::state::{StateStore, TargetRecord};
use crate::target::Target;

/// Why a target has to be rebuilt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// Rebuild requested, or caching disabled for the target
    Forced,
    /// The target was never built
    NoPriorState,
    /// The last build failed
    PreviousFailure,
    /// Options, toolchain or link inputs changed
    OptionsChanged,
    /// Sources were added or removed
    SourceSetChanged,
    /// A source's content changed
    SourceChanged(Utf8PathBuf),
    /// A header included by a source changed, appeared or disappeared
    HeaderChanged {
        source: Utf8PathBuf,
        header: Utf8PathBuf,
    },
    /// A direct dependency was rebuilt during this run
    DependencyRebuilt(String),
    /// A direct dependency was rebuilt after this target's last build
    DependencyChanged(String),
    /// The recorded artifact no longer exists
    ArtifactMissing(Utf8PathBuf),
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleReason::Forced => write!(f, "rebuild forced"),
            StaleReason::NoPriorState => write!(f, "never built"),
            StaleReason::PreviousFailure => write!(f, "last build failed"),
            StaleReason::OptionsChanged => write!(f, "options changed"),
            StaleReason::SourceSetChanged => write!(f, "source list changed"),
            StaleReason::SourceChanged(path) => write!(f, "{} changed", path),
            StaleReason::HeaderChanged { source, header } => {
                write!(f, "{} (included by {}) changed", header, source)
            }
            StaleReason::DependencyRebuilt(dep) => write!(f, "dependency {} was rebuilt", dep),
            StaleReason::DependencyChanged(dep) => {
                write!(f, "dependency {} changed since the last build", dep)
            }
            StaleReason::ArtifactMissing(path) => write!(f, "{} is missing", path),
        }
    }
}

/// Result of a staleness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    UpToDate,
    Stale(StaleReason),
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Staleness::Stale(_))
    }
}

/// Decides which targets need rebuilding
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    store: Arc<dyn StateStore>,
    force: bool,
}

impl ChangeDetector {
    /// Create a detector over a state store
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            force: false,
        }
    }

    /// Treat every target as stale
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Check a target against its last recorded build.
    ///
    /// `sources` are the target's freshly scanned sources and
    /// `rebuilt_dependencies` the targets rebuilt so far in this run. Returns
    /// the first reason found, checked in a fixed order.
    pub fn check(
        &self,
        target: &Target,
        sources: &[SourceFile],
        option_fingerprint: &str,
        rebuilt_dependencies: &HashSet<String>,
    ) -> Staleness {
        match self.stale_reason(target, sources, option_fingerprint, rebuilt_dependencies) {
            Some(reason) => {
                tracing::debug!(name = %target.name, %reason, "Target is stale");
                Staleness::Stale(reason)
            }
            None => {
                tracing::debug!(name = %target.name, "Target is up to date");
                Staleness::UpToDate
            }
        }
    }

    /// Shorthand for [`check`](Self::check) returning a boolean
    pub fn is_stale(
        &self,
        target: &Target,
        sources: &[SourceFile],
        option_fingerprint: &str,
        rebuilt_dependencies: &HashSet<String>,
    ) -> bool {
        self.check(target, sources, option_fingerprint, rebuilt_dependencies)
            .is_stale()
    }

    fn stale_reason(
        &self,
        target: &Target,
        sources: &[SourceFile],
        option_fingerprint: &str,
        rebuilt_dependencies: &HashSet<String>,
    ) -> Option<StaleReason> {
        if self.force || !target.cache {
            return Some(StaleReason::Forced);
        }

        let Some(record) = self.store.read(&target.name) else {
            return Some(StaleReason::NoPriorState);
        };

        if !record.is_success() {
            return Some(StaleReason::PreviousFailure);
        }

        if record.option_fingerprint != option_fingerprint {
            return Some(StaleReason::OptionsChanged);
        }

        if record.sources.len() != sources.len()
            || sources.iter().any(|s| !record.sources.contains_key(&s.path))
        {
            return Some(StaleReason::SourceSetChanged);
        }

        for source in sources {
            let recorded = &record.sources[&source.path];
            if recorded.fingerprint != source.fingerprint {
                return Some(StaleReason::SourceChanged(source.path.clone()));
            }
        }

        for source in sources {
            let recorded = &record.sources[&source.path];
            let changed = source
                .headers
                .iter()
                .find(|(header, fingerprint)| recorded.headers.get(*header) != Some(*fingerprint))
                .map(|(header, _)| header)
                .or_else(|| {
                    recorded
                        .headers
                        .keys()
                        .find(|header| !source.headers.contains_key(*header))
                });
            if let Some(header) = changed {
                return Some(StaleReason::HeaderChanged {
                    source: source.path.clone(),
                    header: header.clone(),
                });
            }
        }

        if let Some(dep) = target.deps.iter().find(|dep| rebuilt_dependencies.contains(*dep)) {
            return Some(StaleReason::DependencyRebuilt(dep.clone()));
        }

        let current = self.dependency_fingerprints(target);
        if let Some(dep) = target
            .deps
            .iter()
            .find(|dep| record.dependencies.get(*dep) != current.get(*dep))
        {
            return Some(StaleReason::DependencyChanged(dep.clone()));
        }

        if !record.artifact.exists() || record.artifact != target.output {
            return Some(StaleReason::ArtifactMissing(target.output.clone()));
        }

        None
    }

    /// Record the final outcome of a target's build
    pub fn commit(&self, target: &str, record: &TargetRecord) -> Result<()> {
        tracing::debug!(name = target, status = ?record.status, "Recording build state");
        self.store.write(target, record)
    }

    /// Recorded fingerprints of a target's direct dependencies.
    ///
    /// Dependencies without a record are left out.
    pub fn dependency_fingerprints(&self, target: &Target) -> BTreeMap<String, String> {
        target
            .deps
            .iter()
            .filter_map(|dep| {
                self.store
                    .read(dep)
                    .map(|record| (dep.clone(), record.fingerprint))
            })
            .collect()
    }

    /// Record of the last build of a target, if any
    pub fn previous(&self, target: &str) -> Option<TargetRecord> {
        self.store.read(target)
    }
}
