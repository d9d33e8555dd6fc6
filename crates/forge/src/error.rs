//! Error types for forge

// This warning is a false positive from thiserror macro expansion
#![allow(unused_assignments)]

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for forge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for forge
#[derive(Debug, Error, Diagnostic)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Malformed or missing project description
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        help: String,
    },

    /// Two targets declared with the same name
    #[error("Duplicate target name: {name}")]
    #[diagnostic(help("Target names must be unique within a project"))]
    DuplicateTarget { name: String },

    /// A target name that is not declared in the project
    #[error("Unknown target: {name}{}", referenced_suffix(.referenced_by))]
    #[diagnostic(help("Check the target names in forge.toml"))]
    UnknownTarget {
        name: String,
        referenced_by: Option<String>,
    },

    /// Circular dependency detected
    #[error("Circular dependency detected between targets: {}", .targets.join(", "))]
    #[diagnostic(help("Check the `deps` lists of these targets in forge.toml"))]
    CyclicDependency {
        /// Targets involved in the cycle(s)
        targets: Vec<String>,
    },

    /// The compiler exited with a nonzero status or could not run
    #[error("Compilation failed for {source_file}")]
    CompilerInvocation {
        source_file: Utf8PathBuf,
        /// Captured compiler output, verbatim
        diagnostics: String,
    },

    /// The linker or archiver exited with a nonzero status or could not run
    #[error("Linking failed for target {target}")]
    Link {
        target: String,
        /// Captured linker output, verbatim
        diagnostics: String,
    },

    /// An abstract option value the toolchain cannot express
    #[error("Option `{option}` is not supported by the {toolchain} toolchain")]
    UnsupportedOption { option: String, toolchain: String },

    /// Build state could not be persisted
    #[error("Build state error: {message}")]
    State {
        message: String,
        help: String,
    },

    /// Build runtime error
    #[error("Build error: {message}")]
    Build {
        message: String,
        help: String,
    },

    /// The build was interrupted
    #[error("Build interrupted")]
    #[diagnostic(help("Targets that completed were recorded; run the build again to resume"))]
    Interrupted,
}

fn referenced_suffix(referenced_by: &Option<String>) -> String {
    referenced_by
        .as_ref()
        .map(|by| format!(" (dependency of {by})"))
        .unwrap_or_default()
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create an unknown target error
    pub fn unknown_target(name: impl Into<String>, referenced_by: Option<&str>) -> Self {
        Self::UnknownTarget {
            name: name.into(),
            referenced_by: referenced_by.map(str::to_string),
        }
    }

    /// Create a circular dependency error
    pub fn cyclic_dependency(targets: Vec<String>) -> Self {
        Self::CyclicDependency { targets }
    }

    /// Create an unsupported option error
    pub fn unsupported_option(option: impl Into<String>, toolchain: impl Into<String>) -> Self {
        Self::UnsupportedOption {
            option: option.into(),
            toolchain: toolchain.into(),
        }
    }

    /// Create a build state error
    pub fn state(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create a build error
    pub fn build(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Whether this error must abort the run before any target is built
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::TomlParse(_)
                | Self::DuplicateTarget { .. }
                | Self::UnknownTarget { .. }
                | Self::CyclicDependency { .. }
        )
    }

    /// Text shown for a failed target: the verbatim tool output when there is
    /// one, otherwise the error message.
    pub fn diagnostic_text(&self) -> String {
        match self {
            Self::CompilerInvocation { diagnostics, .. } | Self::Link { diagnostics, .. } => {
                diagnostics.clone()
            }
            other => other.to_string(),
        }
    }
}
