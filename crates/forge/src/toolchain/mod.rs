//! Compiler toolchains
//!
//! This module provides the toolchain abstraction used by the compiler driver:
//! - A toolchain-neutral option vocabulary ([`BuildOptions`])
//! - The [`Toolchain`] capability trait (compile, link, header discovery)
//! - GNU-style (gcc, clang) and MSVC-style (cl) implementations
//! - Make-style dependency file reading and writing

mod depfile;
mod gnu;
mod msvc;
mod options;

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::build::{CommandOutput, CompileJob, LinkJob};
use crate::target::TargetKind;

pub use depfile::{parse_depfile, read_depfile, write_depfile};
pub use gnu::GnuToolchain;
pub use msvc::MsvcToolchain;
pub use options::{BuildOptions, OptLevel, WarningLevel};

/// Toolchain family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainKind {
    /// gcc, clang and compatible drivers
    #[default]
    Gnu,
    /// Microsoft cl.exe and link.exe
    Msvc,
}

impl std::fmt::Display for ToolchainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolchainKind::Gnu => write!(f, "gnu"),
            ToolchainKind::Msvc => write!(f, "msvc"),
        }
    }
}

impl std::str::FromStr for ToolchainKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gnu" => Ok(ToolchainKind::Gnu),
            "msvc" => Ok(ToolchainKind::Msvc),
            _ => Err(format!("Unknown toolchain: {} (expected gnu or msvc)", s)),
        }
    }
}

/// `[toolchain]` table, also accepted per target as `[targets.toolchain]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    /// Toolchain family (default: gnu)
    pub kind: Option<ToolchainKind>,
    /// Compiler driver executable
    pub compiler: Option<String>,
    /// Linker executable (gnu default: the compiler, msvc default: link)
    pub linker: Option<String>,
    /// Static library archiver (gnu default: ar, msvc default: lib)
    pub archiver: Option<String>,
    /// Program prefixed to every compile command, e.g. ccache
    pub launcher: Option<String>,
}

impl ToolchainConfig {
    /// Toolchain family, defaulting to gnu
    pub fn effective_kind(&self) -> ToolchainKind {
        self.kind.unwrap_or_default()
    }

    /// Layer a per-target override on top of this configuration.
    ///
    /// Switching family discards our program paths, since they belong to the
    /// other family.
    pub fn overridden_by(&self, other: &ToolchainConfig) -> ToolchainConfig {
        if other.kind.is_some() && other.effective_kind() != self.effective_kind() {
            return other.clone();
        }
        ToolchainConfig {
            kind: other.kind.or(self.kind),
            compiler: other.compiler.clone().or_else(|| self.compiler.clone()),
            linker: other.linker.clone().or_else(|| self.linker.clone()),
            archiver: other.archiver.clone().or_else(|| self.archiver.clone()),
            launcher: other.launcher.clone().or_else(|| self.launcher.clone()),
        }
    }

    /// Instantiate the configured toolchain
    pub fn instantiate(&self) -> Arc<dyn Toolchain> {
        match self.effective_kind() {
            ToolchainKind::Gnu => Arc::new(GnuToolchain::from_config(self)),
            ToolchainKind::Msvc => Arc::new(MsvcToolchain::from_config(self)),
        }
    }
}

/// A program and its arguments, ready to be spawned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run this invocation through `launcher`, if any
    pub fn launched_by(self, launcher: Option<&str>) -> Self {
        match launcher {
            Some(launcher) => {
                let mut args = vec![self.program];
                args.extend(self.args);
                Self {
                    program: launcher.to_string(),
                    args,
                }
            }
            None => self,
        }
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Capability set of a compiler front end.
///
/// Implementations only build command lines and interpret outputs; running
/// processes is the job of [`crate::build::CompilerDriver`].
pub trait Toolchain: Send + Sync + std::fmt::Debug {
    /// Toolchain family
    fn kind(&self) -> ToolchainKind;

    /// Stable description of the programs in use, part of the option fingerprint
    fn identity(&self) -> String;

    /// Programs that must be resolvable for builds to work
    fn programs(&self) -> Vec<String>;

    /// Object file extension, without the dot
    fn object_extension(&self) -> &'static str;

    /// Default artifact file name for a target
    fn artifact_file_name(&self, name: &str, kind: TargetKind) -> String;

    /// File that dependents pass to the linker for a library artifact.
    ///
    /// Returns `None` for executables, which cannot be linked against.
    fn link_input(&self, artifact: &Utf8Path, kind: TargetKind) -> Option<Utf8PathBuf> {
        match kind {
            TargetKind::Executable => None,
            TargetKind::StaticLibrary | TargetKind::SharedLibrary => Some(artifact.to_path_buf()),
        }
    }

    /// Translate the shared option vocabulary into compile flags
    fn compile_flags(&self, options: &BuildOptions) -> Result<Vec<String>>;

    /// Command line compiling `job.source` into `job.object`
    fn compile_invocation(&self, job: &CompileJob) -> Result<Invocation>;

    /// Command line producing `job.output`
    fn link_invocation(&self, job: &LinkJob) -> Result<Invocation>;

    /// Headers `job.source` included when it was last compiled.
    ///
    /// Reads the dependency file written by the previous compile; a missing
    /// file yields no headers.
    fn discover_header_dependencies(&self, job: &CompileJob) -> Result<Vec<Utf8PathBuf>> {
        let mut headers = read_depfile(&job.depfile)?;
        headers.retain(|h| h != &job.source);
        Ok(headers)
    }

    /// Post-process a successful compile, e.g. to record included headers
    /// reported on stdout.
    fn capture_header_dependencies(
        &self,
        _job: &CompileJob,
        _output: &mut CommandOutput,
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_same_kind_inherits_programs() {
        let project = ToolchainConfig {
            kind: Some(ToolchainKind::Gnu),
            compiler: Some("clang++".to_string()),
            archiver: Some("llvm-ar".to_string()),
            ..Default::default()
        };
        let target = ToolchainConfig {
            compiler: Some("g++-13".to_string()),
            ..Default::default()
        };

        let merged = project.overridden_by(&target);

        assert_eq!(merged.effective_kind(), ToolchainKind::Gnu);
        assert_eq!(merged.compiler.as_deref(), Some("g++-13"));
        assert_eq!(merged.archiver.as_deref(), Some("llvm-ar"));
    }

    #[test]
    fn test_override_other_kind_discards_programs() {
        let project = ToolchainConfig {
            compiler: Some("clang++".to_string()),
            ..Default::default()
        };
        let target = ToolchainConfig {
            kind: Some(ToolchainKind::Msvc),
            ..Default::default()
        };

        let merged = project.overridden_by(&target);

        assert_eq!(merged.effective_kind(), ToolchainKind::Msvc);
        assert!(merged.compiler.is_none());
        assert_eq!(merged.instantiate().kind(), ToolchainKind::Msvc);
    }

    #[test]
    fn test_parse_toolchain_kind() {
        assert_eq!("gnu".parse::<ToolchainKind>().unwrap(), ToolchainKind::Gnu);
        assert_eq!("MSVC".parse::<ToolchainKind>().unwrap(), ToolchainKind::Msvc);
        assert!("tcc".parse::<ToolchainKind>().is_err());
    }

    #[test]
    fn test_launcher_prefixes_invocation() {
        let invocation = Invocation::new("cc")
            .args(["-c", "a.c"])
            .launched_by(Some("ccache"));

        assert_eq!(invocation.program, "ccache");
        assert_eq!(invocation.args, vec!["cc", "-c", "a.c"]);
        assert_eq!(invocation.to_string(), "ccache cc -c a.c");
    }
}
