//! Build targets
//!
//! This module turns `[[targets]]` configuration entries into [`Target`]s:
//! source patterns are expanded, options are layered and the toolchain is
//! selected.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::config::{Config, TargetConfig};
use crate::toolchain::{BuildOptions, Toolchain, ToolchainConfig};
use crate::{Error, Result};

/// Extensions that must not be listed as sources
const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx", "inl"];

/// What a target produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    Executable,
    StaticLibrary,
    SharedLibrary,
}

impl TargetKind {
    /// Whether other targets can link against this one
    pub fn is_library(self) -> bool {
        !matches!(self, TargetKind::Executable)
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Executable => write!(f, "executable"),
            TargetKind::StaticLibrary => write!(f, "static-library"),
            TargetKind::SharedLibrary => write!(f, "shared-library"),
        }
    }
}

/// A buildable unit with its resolved sources and settings
#[derive(Debug, Clone)]
pub struct Target {
    /// Unique name
    pub name: String,

    /// What the target produces
    pub kind: TargetKind,

    /// Absolute source paths, in declaration order without duplicates
    pub sources: Vec<Utf8PathBuf>,

    /// Names of targets this target depends on
    pub deps: Vec<String>,

    /// Effective options (project defaults plus target overrides)
    pub options: BuildOptions,

    /// Toolchain settings in effect for this target
    pub toolchain_config: ToolchainConfig,

    /// Toolchain in effect for this target
    pub toolchain: Arc<dyn Toolchain>,

    /// Absolute artifact path
    pub output: Utf8PathBuf,

    /// Whether recorded build state may be used to skip this target
    pub cache: bool,
}

impl Target {
    /// Resolve a configured target against the project root
    pub fn from_config(root: &Utf8Path, config: &Config, target: &TargetConfig) -> Result<Self> {
        let toolchain_config = match &target.toolchain {
            Some(overrides) => config.toolchain.overridden_by(overrides),
            None => config.toolchain.clone(),
        };
        let toolchain = toolchain_config.instantiate();

        let mut options = config.options.merged_with(&target.options);
        options.include_dirs = options
            .include_dirs
            .iter()
            .map(|dir| absolutize(root, dir))
            .collect();

        let sources = expand_sources(root, &target.sources, &ignored_dirs(root, config))?;
        if sources.is_empty() {
            return Err(Error::config(
                format!("Target {} matched no source files", target.name),
                format!("Check the patterns {:?} relative to {}", target.sources, root),
            ));
        }

        let output = match &target.output {
            Some(path) => absolutize(root, path),
            None => root
                .join(&config.project.build_dir)
                .join(toolchain.artifact_file_name(&target.name, target.kind)),
        };

        Ok(Target {
            name: target.name.clone(),
            kind: target.kind,
            sources,
            deps: target.deps.clone(),
            options,
            toolchain_config,
            toolchain,
            output,
            cache: target.cache,
        })
    }
}

fn absolutize(root: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Directories never searched for sources: forge's own output and state
fn ignored_dirs(root: &Utf8Path, config: &Config) -> Vec<Utf8PathBuf> {
    vec![
        root.join(&config.project.build_dir),
        root.join(&config.project.state_dir),
    ]
}

/// Expand source entries into absolute, de-duplicated paths.
///
/// Plain entries are taken as is; entries containing glob metacharacters are
/// matched against the files under the project root. Anything below a hidden
/// (dot-prefixed) directory is skipped. Listing a header is an error.
pub fn expand_sources(
    root: &Utf8Path,
    entries: &[String],
    ignored: &[Utf8PathBuf],
) -> Result<Vec<Utf8PathBuf>> {
    let mut sources: Vec<Utf8PathBuf> = Vec::new();

    for entry in entries {
        let matches = if entry.contains(['*', '?', '[']) {
            glob_matches(root, entry, ignored)?
        } else {
            let path = absolutize(root, Utf8Path::new(entry));
            if !path.is_file() {
                return Err(Error::config(
                    format!("Source file not found: {}", entry),
                    format!("Paths are resolved relative to {}", root),
                ));
            }
            vec![path]
        };

        for path in matches {
            if is_hidden(root, &path) {
                tracing::debug!(path = %path, "Skipping hidden source");
                continue;
            }
            if is_header(&path) {
                return Err(Error::config(
                    format!("Header file listed as a source: {}", path),
                    "Headers are discovered automatically; list only translation units",
                ));
            }
            if !sources.contains(&path) {
                sources.push(path);
            }
        }
    }

    Ok(sources)
}

fn glob_matches(root: &Utf8Path, pattern: &str, ignored: &[Utf8PathBuf]) -> Result<Vec<Utf8PathBuf>> {
    let absolute_pattern = if Utf8Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        format!("{}/{}", glob::Pattern::escape(root.as_str()), pattern)
    };
    let matcher = glob::Pattern::new(&absolute_pattern).map_err(|e| {
        Error::config(
            format!("Invalid source pattern {:?}: {}", pattern, e),
            "See the glob syntax: *, **, ? and [...]",
        )
    })?;
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let walker = WalkDir::new(root).follow_links(true).sort_by_file_name();
    let mut matches = Vec::new();

    for entry in walker
        .into_iter()
        .filter_entry(|e| should_visit(e, ignored))
    {
        let entry = entry.map_err(|e| {
            Error::config(
                format!("Failed to read directory entry: {}", e),
                "Check directory permissions",
            )
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        let Some(path) = Utf8Path::from_path(entry.path()) else {
            tracing::warn!(path = ?entry.path(), "Skipping non UTF-8 path");
            continue;
        };
        if matcher.matches_with(path.as_str(), options) {
            matches.push(path.to_path_buf());
        }
    }

    Ok(matches)
}

/// Check if a directory entry should be visited while expanding globs
fn should_visit(entry: &walkdir::DirEntry, ignored: &[Utf8PathBuf]) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    if entry.file_name().to_string_lossy().starts_with('.') {
        return false;
    }
    !ignored.iter().any(|dir| entry.path() == dir.as_std_path())
}

fn is_hidden(root: &Utf8Path, path: &Utf8Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| c.as_str().starts_with('.') && c.as_str() != "." && c.as_str() != "..")
}

fn is_header(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| HEADER_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup_sources() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src/net")).unwrap();
        fs::create_dir_all(root.join("src/.cache")).unwrap();
        fs::create_dir_all(root.join("build")).unwrap();
        fs::write(root.join("src/main.cpp"), "int main() {}").unwrap();
        fs::write(root.join("src/util.cpp"), "").unwrap();
        fs::write(root.join("src/net/socket.cpp"), "").unwrap();
        fs::write(root.join("src/net/socket.h"), "").unwrap();
        fs::write(root.join("src/.cache/stale.cpp"), "").unwrap();
        fs::write(root.join("build/generated.cpp"), "").unwrap();
        temp_dir
    }

    fn root(temp_dir: &TempDir) -> &Utf8Path {
        Utf8Path::from_path(temp_dir.path()).unwrap()
    }

    #[test]
    fn test_expand_recursive_glob() {
        let temp_dir = setup_sources();
        let root = root(&temp_dir);

        let sources = expand_sources(
            root,
            &["src/**/*.cpp".to_string()],
            &[root.join("build")],
        )
        .unwrap();

        let relative: Vec<_> = sources
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string())
            .collect();
        assert_eq!(relative, vec!["src/main.cpp", "src/net/socket.cpp", "src/util.cpp"]);
    }

    #[test]
    fn test_expand_keeps_declaration_order_and_dedups() {
        let temp_dir = setup_sources();
        let root = root(&temp_dir);

        let sources = expand_sources(
            root,
            &["src/util.cpp".to_string(), "src/*.cpp".to_string()],
            &[],
        )
        .unwrap();

        assert_eq!(sources, vec![root.join("src/util.cpp"), root.join("src/main.cpp")]);
    }

    #[test]
    fn test_header_source_is_error() {
        let temp_dir = setup_sources();
        let root = root(&temp_dir);

        let result = expand_sources(root, &["src/net/socket.h".to_string()], &[]);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_missing_source_is_error() {
        let temp_dir = setup_sources();
        let root = root(&temp_dir);

        let result = expand_sources(root, &["src/missing.cpp".to_string()], &[]);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_target_from_config() {
        let temp_dir = setup_sources();
        let root = root(&temp_dir);
        let config = Config::parse(
            r#"
[options]
include_dirs = ["include"]
warnings = "all"

[[targets]]
name = "net"
kind = "static-library"
sources = ["src/net/*.cpp"]

[targets.options]
defines = ["NET"]
"#,
        )
        .unwrap();

        let target = Target::from_config(root, &config, &config.targets[0]).unwrap();

        assert_eq!(target.sources, vec![root.join("src/net/socket.cpp")]);
        assert_eq!(target.options.include_dirs, vec![root.join("include")]);
        assert_eq!(target.options.defines, vec!["NET"]);
        assert_eq!(target.output, root.join("build/libnet.a"));
        assert!(target.kind.is_library());
    }

    #[test]
    fn test_target_with_no_matches_is_error() {
        let temp_dir = setup_sources();
        let root = root(&temp_dir);
        let config = Config::parse(
            r#"
[[targets]]
name = "empty"
kind = "executable"
sources = ["src/**/*.c"]
"#,
        )
        .unwrap();

        let result = Target::from_config(root, &config, &config.targets[0]);
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
