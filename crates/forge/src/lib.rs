//! forge - incremental build system for C and C++
//!
//! This crate provides both a library and CLI for forge, including:
//! - Configuration file parsing and merging
//! - Target graph construction and topological ordering
//! - Content fingerprinting and change detection against recorded build state
//! - GNU-style and MSVC-style toolchains behind a common option vocabulary
//! - Parallel build orchestration with progress display

pub mod build;
pub mod commands;
pub mod config;
pub mod error;
pub mod graph;
pub mod project;
pub mod scaffold;
pub mod source;
pub mod stale;
pub mod state;
pub mod target;
pub mod toolchain;

pub use error::{Error, Result};
