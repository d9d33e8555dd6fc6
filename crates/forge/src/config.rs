//! Project configuration parsing and merging
//!
//! This module handles parsing of `forge.toml` and `forge.local.toml` files.
//! The local file is merged over the base file: tables merge recursively,
//! arrays and scalars from the local file replace the base values.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::target::TargetKind;
use crate::toolchain::{BuildOptions, ToolchainConfig};
use crate::{Error, Result};

/// Name of the project description file
pub const CONFIG_FILE: &str = "forge.toml";

/// Name of the untracked, per-machine override file
pub const LOCAL_CONFIG_FILE: &str = "forge.local.toml";

/// Main configuration structure for forge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project settings
    pub project: ProjectConfig,

    /// Build settings
    pub build: BuildConfig,

    /// Default toolchain for every target
    pub toolchain: ToolchainConfig,

    /// Project-wide option defaults, overridden per target
    pub options: BuildOptions,

    /// Declared targets, in declaration order
    pub targets: Vec<TargetConfig>,
}

/// Project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name (informational)
    pub name: Option<String>,

    /// Build artifacts directory (default: "build")
    pub build_dir: Utf8PathBuf,

    /// State directory for forge internal files (default: ".forge")
    pub state_dir: Utf8PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: None,
            build_dir: Utf8PathBuf::from("build"),
            state_dir: Utf8PathBuf::from(".forge"),
        }
    }
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Number of parallel jobs (default: number of logical CPUs)
    pub jobs: Option<usize>,

    /// Ceiling in seconds for a single compiler or linker invocation
    pub compile_timeout: Option<u64>,

    /// Use recorded build state to skip up-to-date targets (default: true)
    pub cache: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            jobs: None,
            compile_timeout: None,
            cache: true,
        }
    }
}

/// A `[[targets]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Unique target name
    pub name: String,

    /// What the target produces
    pub kind: TargetKind,

    /// Source files or glob patterns, relative to the project root
    #[serde(default)]
    pub sources: Vec<String>,

    /// Names of targets this target links against
    #[serde(default)]
    pub deps: Vec<String>,

    /// Output artifact path, relative to the project root
    pub output: Option<Utf8PathBuf>,

    /// Set to false to rebuild this target on every run
    #[serde(default = "default_true")]
    pub cache: bool,

    /// Option overrides for this target
    #[serde(default)]
    pub options: BuildOptions,

    /// Toolchain override for this target
    pub toolchain: Option<ToolchainConfig>,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a project directory.
    ///
    /// This loads `forge.toml` and merges `forge.local.toml` if it exists.
    /// A missing `forge.toml` is a configuration error.
    pub fn load(project_root: &Utf8Path) -> Result<Self> {
        let config_path = project_root.join(CONFIG_FILE);
        let local_config_path = project_root.join(LOCAL_CONFIG_FILE);

        if !config_path.exists() {
            return Err(Error::config(
                format!("No {} found in {}", CONFIG_FILE, project_root),
                "Run `forge init` to create a project, or pass --project <DIR>",
            ));
        }

        let content = std::fs::read_to_string(&config_path)?;
        let base_config = toml::from_str::<toml::Value>(&content)?;

        let local_config = if local_config_path.exists() {
            let content = std::fs::read_to_string(&local_config_path)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        } else {
            None
        };

        let merged = if let Some(local) = local_config {
            merge_toml_values(base_config, local)
        } else {
            base_config
        };

        let config: Config = merged.try_into()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a string
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the effective number of jobs
    pub fn effective_jobs(&self) -> usize {
        self.build
            .jobs
            .filter(|jobs| *jobs > 0)
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
    }

    /// Find a declared target by name
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Structural checks that do not need the file system
    fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::config(
                "The project declares no targets",
                "Add at least one [[targets]] table to forge.toml",
            ));
        }

        for target in &self.targets {
            if !is_valid_target_name(&target.name) {
                return Err(Error::config(
                    format!("Invalid target name: {:?}", target.name),
                    "Target names may contain only letters, digits, '_', '-' and '.', and must not start with '.'",
                ));
            }
            if target.sources.is_empty() {
                return Err(Error::config(
                    format!("Target {} has no sources", target.name),
                    "List source files or glob patterns in `sources`",
                ));
            }
        }

        Ok(())
    }
}

/// Target names end up in file names, so keep them path-safe
fn is_valid_target_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Merge two TOML values:
/// - Tables: recursively merged
/// - Arrays: local replaces base (not merged)
/// - Primitives: local overrides base
fn merge_toml_values(base: toml::Value, local: toml::Value) -> toml::Value {
    match (base, local) {
        (toml::Value::Table(mut base_table), toml::Value::Table(local_table)) => {
            for (key, local_value) in local_table {
                if let Some(base_value) = base_table.remove(&key) {
                    base_table.insert(key, merge_toml_values(base_value, local_value));
                } else {
                    base_table.insert(key, local_value);
                }
            }
            toml::Value::Table(base_table)
        }
        (_, local) => local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::{OptLevel, ToolchainKind, WarningLevel};

    const MINIMAL: &str = r#"
[[targets]]
name = "app"
kind = "executable"
sources = ["src/main.cpp"]
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.project.build_dir, Utf8PathBuf::from("build"));
        assert_eq!(config.project.state_dir, Utf8PathBuf::from(".forge"));
        assert!(config.build.jobs.is_none());
        assert!(config.build.cache);
        assert_eq!(config.toolchain.effective_kind(), ToolchainKind::Gnu);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse(MINIMAL).unwrap();

        assert_eq!(config.targets.len(), 1);
        let app = config.target("app").unwrap();
        assert_eq!(app.kind, TargetKind::Executable);
        assert!(app.deps.is_empty());
        assert!(app.cache);
        assert!(app.toolchain.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let content = r#"
[project]
name = "demo"
build_dir = "out"
state_dir = ".state"

[build]
jobs = 8
compile_timeout = 120
cache = false

[toolchain]
kind = "gnu"
compiler = "clang++"
archiver = "llvm-ar"
launcher = "ccache"

[options]
optimization = "2"
warnings = "all"
standard = "c++17"
include_dirs = ["include"]
defines = ["NDEBUG"]

[[targets]]
name = "core"
kind = "static-library"
sources = ["src/core/**/*.cpp"]

[[targets]]
name = "app"
kind = "executable"
sources = ["src/main.cpp"]
deps = ["core"]
output = "bin/app"

[targets.options]
optimization = "3"
libs = ["m"]

[targets.toolchain]
kind = "msvc"
"#;

        let config = Config::parse(content).unwrap();

        assert_eq!(config.project.name.as_deref(), Some("demo"));
        assert_eq!(config.project.build_dir, Utf8PathBuf::from("out"));
        assert_eq!(config.build.jobs, Some(8));
        assert_eq!(config.build.compile_timeout, Some(120));
        assert!(!config.build.cache);
        assert_eq!(config.toolchain.compiler.as_deref(), Some("clang++"));
        assert_eq!(config.toolchain.launcher.as_deref(), Some("ccache"));
        assert_eq!(config.options.optimization, Some(OptLevel::O2));
        assert_eq!(config.options.warnings, Some(WarningLevel::All));
        assert_eq!(config.options.include_dirs, vec![Utf8PathBuf::from("include")]);

        let names: Vec<_> = config.targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["core", "app"]);

        let app = config.target("app").unwrap();
        assert_eq!(app.deps, vec!["core"]);
        assert_eq!(app.output, Some(Utf8PathBuf::from("bin/app")));
        assert_eq!(app.options.optimization, Some(OptLevel::O3));
        assert_eq!(app.options.libs, vec!["m"]);
        assert_eq!(app.toolchain.as_ref().unwrap().kind, Some(ToolchainKind::Msvc));
    }

    #[test]
    fn test_no_targets_is_error() {
        let result = Config::parse("[build]\njobs = 2\n");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_invalid_target_name_is_error() {
        let content = r#"
[[targets]]
name = "../escape"
kind = "executable"
sources = ["main.c"]
"#;
        assert!(matches!(Config::parse(content), Err(Error::Config { .. })));
    }

    #[test]
    fn test_unknown_target_kind_is_error() {
        let content = r#"
[[targets]]
name = "app"
kind = "plugin"
sources = ["main.c"]
"#;
        assert!(matches!(Config::parse(content), Err(Error::TomlParse(_))));
    }

    #[test]
    fn test_merge_configs_via_toml_value() {
        let base = r#"
[build]
jobs = 8

[options]
defines = ["A"]
warnings = "all"
"#;

        let local = r#"
[build]
jobs = 16

[options]
defines = ["B"]
"#;

        let base_value: toml::Value = toml::from_str(base).unwrap();
        let local_value: toml::Value = toml::from_str(local).unwrap();
        let merged_value = merge_toml_values(base_value, local_value);
        let merged: Config = merged_value.try_into().unwrap();

        assert_eq!(merged.build.jobs, Some(16));
        // warnings should be from base (local didn't define it)
        assert_eq!(merged.options.warnings, Some(WarningLevel::All));
        // defines is an array, so local replaces base completely
        assert_eq!(merged.options.defines, vec!["B"]);
    }

    #[test]
    fn test_load_from_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp_dir.path()).unwrap();

        std::fs::write(root.join(CONFIG_FILE), format!("[build]\njobs = 4\n{MINIMAL}")).unwrap();
        std::fs::write(root.join(LOCAL_CONFIG_FILE), "[build]\njobs = 16\n").unwrap();

        let config = Config::load(root).unwrap();

        assert_eq!(config.build.jobs, Some(16));
        assert_eq!(config.targets.len(), 1);
    }

    #[test]
    fn test_load_missing_config_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp_dir.path()).unwrap();

        let result = Config::load(root);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_effective_jobs() {
        let mut config = Config::parse(MINIMAL).unwrap();
        config.build.jobs = Some(3);
        assert_eq!(config.effective_jobs(), 3);

        config.build.jobs = Some(0);
        assert!(config.effective_jobs() >= 1);
    }
}
