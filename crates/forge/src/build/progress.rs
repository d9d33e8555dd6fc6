//! Progress display for parallel builds
//!
//! This module provides progress bar functionality using indicatif,
//! integrated with tracing for clean log output.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::time::Duration;

use super::report::BuildOutcome;

/// Phase of a target within one build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPhase {
    Pending,
    Scheduled,
    Compiling,
    Linking,
    Done,
}

impl std::fmt::Display for TargetPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetPhase::Pending => write!(f, "pending"),
            TargetPhase::Scheduled => write!(f, "checking"),
            TargetPhase::Compiling => write!(f, "compiling"),
            TargetPhase::Linking => write!(f, "linking"),
            TargetPhase::Done => write!(f, "done"),
        }
    }
}

/// Progress manager for parallel target builds
pub struct BuildProgress {
    /// Multi-progress container for all progress bars
    multi: MultiProgress,
    /// Active spinners indexed by target name
    bars: HashMap<String, ProgressBar>,
    /// Finished targets count
    completed: usize,
    /// Total targets count
    total: usize,
    /// Main progress bar showing overall progress
    main_bar: ProgressBar,
}

impl BuildProgress {
    /// Create a new build progress manager drawing to stderr
    pub fn new(total: usize) -> Self {
        Self::with_multi_progress(total, MultiProgress::new())
    }

    /// Create a progress manager that draws nothing
    pub fn hidden(total: usize) -> Self {
        Self::with_multi_progress(
            total,
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        )
    }

    fn with_multi_progress(total: usize, multi: MultiProgress) -> Self {
        let main_bar = multi.add(ProgressBar::new(total as u64));
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} targets",
        ) {
            main_bar.set_style(style.progress_chars("#>-"));
        }
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            bars: HashMap::new(),
            completed: 0,
            total,
            main_bar,
        }
    }

    /// Show the current phase of a target, creating its spinner on first use
    pub fn set_phase(&mut self, target: &str, phase: TargetPhase) {
        if !self.bars.contains_key(target) {
            let bar = self.multi.add(ProgressBar::new_spinner());
            if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.yellow} {msg}") {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            self.bars.insert(target.to_string(), bar);
        }
        if let Some(bar) = self.bars.get(target) {
            bar.set_message(format!("{} ({})", target, phase));
        }
    }

    /// Show the latest tool output line for a target
    pub fn update_target_log(&self, target: &str, line: &str) {
        if let Some(bar) = self.bars.get(target) {
            bar.set_message(format!("{}: {}", target, line));
        }
    }

    /// Mark a target as finished
    pub fn finish_target(&mut self, target: &str, outcome: &BuildOutcome) {
        if let Some(bar) = self.bars.remove(target) {
            match outcome {
                BuildOutcome::Failure { .. } => {
                    bar.abandon_with_message(format!("{}: FAILED", target));
                }
                _ => bar.finish_and_clear(),
            }
        }
        self.completed += 1;
        self.main_bar.set_position(self.completed as u64);
    }

    /// Finish all progress bars
    pub fn finish(&self) {
        self.main_bar
            .finish_with_message(format!("{}/{} targets", self.completed, self.total));
    }

    /// Suspend progress bars during a closure (for clean output)
    pub fn suspend<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.multi.suspend(f)
    }
}

impl Drop for BuildProgress {
    fn drop(&mut self) {
        // Clear any remaining progress bars
        for (_, bar) in self.bars.drain() {
            bar.finish_and_clear();
        }
    }
}
