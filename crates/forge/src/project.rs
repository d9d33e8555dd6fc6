//! Project loading
//!
//! A [`Project`] is a loaded `forge.toml`: its root directory, configuration
//! and validated target graph with the resolved build order.

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::Config;
use crate::graph::TargetGraph;
use crate::target::{Target, TargetKind};
use crate::{Error, Result};

/// A loaded project
#[derive(Debug)]
pub struct Project {
    /// Root directory of the project
    pub root: Utf8PathBuf,

    /// Configuration
    pub config: Config,

    /// Target graph
    pub graph: TargetGraph,

    /// Build order (topologically sorted target names)
    pub build_order: Vec<String>,
}

impl Project {
    /// Load the project rooted at `root`
    pub fn load(root: &Utf8Path) -> Result<Self> {
        let config = Config::load(root)?;
        Self::with_config(root, config)
    }

    /// Build a project from an already parsed configuration.
    ///
    /// Fails before touching any build state when a target is malformed,
    /// declared twice, depends on an unknown target or sits on a cycle.
    pub fn with_config(root: &Utf8Path, config: Config) -> Result<Self> {
        let root = root.canonicalize_utf8().map_err(|e| {
            Error::config(
                format!("Failed to canonicalize project root {}: {}", root, e),
                "Ensure the path exists and is accessible",
            )
        })?;

        let mut graph = TargetGraph::new();
        for target_config in &config.targets {
            graph.add_target(Target::from_config(&root, &config, target_config)?)?;
        }
        let build_order = graph.build_order()?;

        tracing::debug!(root = %root, targets = build_order.len(), "Loaded project");

        Ok(Project {
            root,
            config,
            graph,
            build_order,
        })
    }

    /// Get a target by name
    pub fn target(&self, name: &str) -> Result<&Target> {
        self.graph.lookup(name)
    }

    /// Get targets in build order
    pub fn targets_in_build_order(&self) -> impl Iterator<Item = &Target> {
        self.build_order
            .iter()
            .filter_map(|name| self.graph.lookup(name).ok())
    }

    /// Names of the targets to build, in build order.
    ///
    /// `None` selects every target; otherwise the named targets and
    /// everything they depend on.
    pub fn selection(&self, names: Option<&[String]>) -> Result<Vec<String>> {
        let Some(names) = names.filter(|names| !names.is_empty()) else {
            return Ok(self.build_order.clone());
        };
        let selected = self.graph.closure(names)?;
        Ok(self
            .build_order
            .iter()
            .filter(|name| selected.contains(name))
            .cloned()
            .collect())
    }

    /// The first declared executable target
    pub fn default_executable(&self) -> Option<&Target> {
        self.graph
            .targets()
            .find(|target| target.kind == TargetKind::Executable)
    }

    /// Get the build directory
    pub fn build_dir(&self) -> Utf8PathBuf {
        self.root.join(&self.config.project.build_dir)
    }

    /// Get the object directory for a target
    pub fn object_dir(&self, target: &str) -> Utf8PathBuf {
        self.build_dir().join("obj").join(target)
    }

    /// Get the state directory
    pub fn state_dir(&self) -> Utf8PathBuf {
        self.root.join(&self.config.project.state_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_FILE;
    use std::fs;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
[[targets]]
name = "app"
kind = "executable"
sources = ["src/main.c"]
deps = ["net"]

[[targets]]
name = "net"
kind = "static-library"
sources = ["src/net.c"]
deps = ["core"]

[[targets]]
name = "core"
kind = "static-library"
sources = ["src/core.c"]

[[targets]]
name = "tool"
kind = "executable"
sources = ["src/tool.c"]
"#;

    fn create_project(config: &str) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        for file in ["main.c", "net.c", "core.c", "tool.c"] {
            fs::write(root.join("src").join(file), "").unwrap();
        }
        fs::write(root.join(CONFIG_FILE), config).unwrap();
        temp_dir
    }

    #[test]
    fn test_load_project() {
        let temp_dir = create_project(CONFIG);
        let project = Project::load(Utf8Path::from_path(temp_dir.path()).unwrap()).unwrap();

        assert_eq!(project.build_order, vec!["core", "net", "app", "tool"]);
        assert_eq!(project.default_executable().unwrap().name, "app");
        assert_eq!(project.object_dir("net"), project.root.join("build/obj/net"));
        assert_eq!(project.state_dir(), project.root.join(".forge"));
    }

    #[test]
    fn test_selection_includes_dependencies() {
        let temp_dir = create_project(CONFIG);
        let project = Project::load(Utf8Path::from_path(temp_dir.path()).unwrap()).unwrap();

        let all = project.selection(None).unwrap();
        assert_eq!(all.len(), 4);

        let selected = project.selection(Some(&["net".to_string()])).unwrap();
        assert_eq!(selected, vec!["core", "net"]);

        let result = project.selection(Some(&["nope".to_string()]));
        assert!(matches!(result, Err(Error::UnknownTarget { .. })));
    }

    #[test]
    fn test_cycle_is_rejected_at_load() {
        let config = CONFIG.replace(
            "sources = [\"src/core.c\"]",
            "sources = [\"src/core.c\"]\ndeps = [\"app\"]",
        );
        let temp_dir = create_project(&config);

        let result = Project::load(Utf8Path::from_path(temp_dir.path()).unwrap());

        match result {
            Err(Error::CyclicDependency { targets }) => {
                assert_eq!(targets, vec!["app", "net", "core"]);
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_target_is_rejected_at_load() {
        let config = format!(
            "{}\n[[targets]]\nname = \"core\"\nkind = \"static-library\"\nsources = [\"src/core.c\"]\n",
            CONFIG
        );
        let temp_dir = create_project(&config);

        let result = Project::load(Utf8Path::from_path(temp_dir.path()).unwrap());
        assert!(matches!(result, Err(Error::DuplicateTarget { .. })));
    }
}
