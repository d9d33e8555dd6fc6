//! Build outcomes

use std::time::Duration;

use camino::Utf8PathBuf;

/// Final outcome of one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Rebuilt successfully
    Success,
    /// A compile or link step failed; diagnostics are the tool output
    Failure { diagnostics: String },
    /// Nothing changed since the last successful build
    UpToDate,
    /// Not attempted because a dependency failed
    DependencyFailed { dependency: String },
}

impl BuildOutcome {
    /// Whether the target's artifact is usable after this run
    pub fn is_ok(&self) -> bool {
        matches!(self, BuildOutcome::Success | BuildOutcome::UpToDate)
    }
}

impl std::fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildOutcome::Success => write!(f, "built"),
            BuildOutcome::Failure { .. } => write!(f, "FAILED"),
            BuildOutcome::UpToDate => write!(f, "up to date"),
            BuildOutcome::DependencyFailed { dependency } => {
                write!(f, "skipped (dependency {} failed)", dependency)
            }
        }
    }
}

/// Result of building one target
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub target: String,
    pub outcome: BuildOutcome,
    /// Artifact path, when the artifact is usable
    pub artifact: Option<Utf8PathBuf>,
    /// Number of sources compiled in this run
    pub compiled: usize,
    pub duration: Duration,
}

/// Results of every selected target, in topological order
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub results: Vec<BuildResult>,
}

impl BuildReport {
    /// True when no target failed, directly or through a dependency
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_ok())
    }

    /// Result for a target
    pub fn get(&self, target: &str) -> Option<&BuildResult> {
        self.results.iter().find(|r| r.target == target)
    }

    /// Outcome for a target
    pub fn outcome(&self, target: &str) -> Option<&BuildOutcome> {
        self.get(target).map(|r| &r.outcome)
    }

    /// Targets that failed themselves
    pub fn failures(&self) -> impl Iterator<Item = &BuildResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, BuildOutcome::Failure { .. }))
    }

    /// Count of (built, up to date, failed, skipped) targets
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let mut counts = (0, 0, 0, 0);
        for result in &self.results {
            match result.outcome {
                BuildOutcome::Success => counts.0 += 1,
                BuildOutcome::UpToDate => counts.1 += 1,
                BuildOutcome::Failure { .. } => counts.2 += 1,
                BuildOutcome::DependencyFailed { .. } => counts.3 += 1,
            }
        }
        counts
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        let (built, up_to_date, failed, skipped) = self.counts();
        let mut summary = format!("{} built, {} up to date", built, up_to_date);
        if failed > 0 {
            summary.push_str(&format!(", {} failed", failed));
        }
        if skipped > 0 {
            summary.push_str(&format!(", {} skipped", skipped));
        }
        summary
    }
}
