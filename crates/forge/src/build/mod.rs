//! Build engine for C and C++ targets
//!
//! This module provides the build functionality for forge, including:
//! - Build orchestration with dependency ordering
//! - Compile and link jobs run through a toolchain by the compiler driver
//! - Command execution with output capture
//! - Parallel execution with progress display

mod builder;
mod command_logger;
mod driver;
mod job;
mod parallel;
mod progress;
mod report;

pub use builder::{BuildArgs, Builder};
pub use command_logger::{CommandOutput, LogCallback, run_command_capture};
pub use driver::CompilerDriver;
pub use job::{CompileJob, LinkJob, object_path};
pub use parallel::ParallelExecutor;
pub use progress::{BuildProgress, TargetPhase};
pub use report::{BuildOutcome, BuildReport, BuildResult};
