//! Units of work handed to a toolchain

use camino::{Utf8Path, Utf8PathBuf};

use crate::target::TargetKind;
use crate::toolchain::BuildOptions;

/// One compiler invocation: a single source to a single object file
#[derive(Debug, Clone)]
pub struct CompileJob {
    /// Owning target
    pub target: String,
    /// What the owning target produces (shared libraries need PIC objects)
    pub kind: TargetKind,
    /// Source file
    pub source: Utf8PathBuf,
    /// Object file to produce
    pub object: Utf8PathBuf,
    /// Make-style dependency file listing the headers the source included
    pub depfile: Utf8PathBuf,
    /// Effective options for the owning target
    pub options: BuildOptions,
}

impl CompileJob {
    /// Create a compile job, deriving the depfile path from the object path
    pub fn new(
        target: &str,
        kind: TargetKind,
        source: Utf8PathBuf,
        object: Utf8PathBuf,
        options: BuildOptions,
    ) -> Self {
        let depfile = Utf8PathBuf::from(format!("{}.d", object));
        Self {
            target: target.to_string(),
            kind,
            source,
            object,
            depfile,
            options,
        }
    }
}

/// One link (or archive) step producing a target's artifact
#[derive(Debug, Clone)]
pub struct LinkJob {
    /// Target being linked
    pub target: String,
    /// What to produce
    pub kind: TargetKind,
    /// Object files of the target, in source order
    pub objects: Vec<Utf8PathBuf>,
    /// Library artifacts of dependencies, dependents before dependencies
    pub libraries: Vec<Utf8PathBuf>,
    /// Artifact path
    pub output: Utf8PathBuf,
    /// Effective options for the target
    pub options: BuildOptions,
}

/// Object file path for `source` under `object_dir`.
///
/// The source's path relative to the project root is kept so that equally
/// named files in different directories do not collide.
pub fn object_path(
    project_root: &Utf8Path,
    object_dir: &Utf8Path,
    source: &Utf8Path,
    extension: &str,
) -> Utf8PathBuf {
    let relative = source.strip_prefix(project_root).unwrap_or(source);
    let mut flattened = Utf8PathBuf::new();
    for component in relative.components() {
        match component {
            camino::Utf8Component::Normal(part) => flattened.push(part),
            camino::Utf8Component::ParentDir => flattened.push("__"),
            _ => {}
        }
    }
    object_dir.join(format!("{}.{}", flattened, extension))
}
