//! Target dependency graph
//!
//! Targets live in an arena (a petgraph `DiGraph` whose node indices follow
//! declaration order) and refer to each other by name. Edges run from a
//! dependency to its dependent.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::target::Target;
use crate::{Error, Result};

/// Dependency graph over a project's targets
#[derive(Debug, Default)]
pub struct TargetGraph {
    graph: DiGraph<Target, ()>,
    indices: HashMap<String, NodeIndex>,
    edges_resolved: bool,
}

impl TargetGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of targets
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph has no targets
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Add a target. Fails if a target with the same name exists.
    pub fn add_target(&mut self, target: Target) -> Result<()> {
        if self.indices.contains_key(&target.name) {
            return Err(Error::DuplicateTarget { name: target.name });
        }
        let name = target.name.clone();
        let index = self.graph.add_node(target);
        self.indices.insert(name, index);
        self.edges_resolved = false;
        Ok(())
    }

    /// Look up a target by name
    pub fn lookup(&self, name: &str) -> Result<&Target> {
        self.indices
            .get(name)
            .map(|&index| &self.graph[index])
            .ok_or_else(|| Error::unknown_target(name, None))
    }

    /// Targets in declaration order
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.graph.node_indices().map(move |index| &self.graph[index])
    }

    /// Resolve dependency names into edges.
    ///
    /// Fails with `UnknownTarget` if a dependency is not declared.
    fn resolve_edges(&mut self) -> Result<()> {
        if self.edges_resolved {
            return Ok(());
        }
        self.graph.clear_edges();

        let mut edges = Vec::new();
        for dependent in self.graph.node_indices() {
            let target = &self.graph[dependent];
            for dep in &target.deps {
                let dependency = self
                    .indices
                    .get(dep)
                    .copied()
                    .ok_or_else(|| Error::unknown_target(dep, Some(&target.name)))?;
                edges.push((dependency, dependent));
            }
        }
        for (dependency, dependent) in edges {
            self.graph.update_edge(dependency, dependent, ());
        }

        self.edges_resolved = true;
        Ok(())
    }

    /// Targets in topological order, dependencies first.
    ///
    /// Independent targets keep their declaration order. Fails with
    /// `CyclicDependency` naming every target on a cycle.
    pub fn resolve_dependency_order(&mut self) -> Result<BuildOrder<'_>> {
        self.resolve_edges()?;
        let order = self.topological_indices()?;
        Ok(BuildOrder {
            graph: &self.graph,
            order: order.into_iter(),
        })
    }

    /// Names of the targets in topological order
    pub fn build_order(&mut self) -> Result<Vec<String>> {
        Ok(self
            .resolve_dependency_order()?
            .map(|target| target.name.clone())
            .collect())
    }

    /// Kahn's algorithm with a min-heap on node index for deterministic ties
    fn topological_indices(&self) -> Result<Vec<NodeIndex>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|index| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(index, _)| Reverse(index))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(index)) = ready.pop() {
            let node = NodeIndex::new(index);
            order.push(node);
            for dependent in self.graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[dependent.index()] -= 1;
                if in_degree[dependent.index()] == 0 {
                    ready.push(Reverse(dependent.index()));
                }
            }
        }

        if order.len() < self.graph.node_count() {
            return Err(Error::cyclic_dependency(self.cycle_members()));
        }
        Ok(order)
    }

    /// Every target that sits on a cycle, in declaration order
    fn cycle_members(&self) -> Vec<String> {
        let mut members: Vec<NodeIndex> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || self
                        .graph
                        .contains_edge(component[0], component[0])
            })
            .flatten()
            .collect();
        members.sort();
        members
            .into_iter()
            .map(|index| self.graph[index].name.clone())
            .collect()
    }

    /// Direct dependents of a target
    pub fn dependents(&self, name: &str) -> Result<Vec<&Target>> {
        let index = self.index_of(name)?;
        let mut dependents: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        dependents.sort();
        dependents.dedup();
        Ok(dependents.into_iter().map(|i| &self.graph[i]).collect())
    }

    /// All targets a target depends on, directly or not, in link order:
    /// every library appears before the libraries it depends on.
    pub fn transitive_dependencies(&self, name: &str) -> Result<Vec<&Target>> {
        let target = self.lookup(name)?;
        let mut visited = HashSet::new();
        let mut post_order = Vec::new();
        for dep in &target.deps {
            self.visit_dependencies(dep, &mut visited, &mut post_order)?;
        }
        post_order.reverse();
        Ok(post_order)
    }

    fn visit_dependencies<'a>(
        &'a self,
        name: &str,
        visited: &mut HashSet<String>,
        post_order: &mut Vec<&'a Target>,
    ) -> Result<()> {
        if !visited.insert(name.to_string()) {
            return Ok(());
        }
        let target = self.lookup(name)?;
        for dep in &target.deps {
            self.visit_dependencies(dep, visited, post_order)?;
        }
        post_order.push(target);
        Ok(())
    }

    /// Every target that depends on `name`, directly or not
    pub fn transitive_dependents(&self, name: &str) -> Result<Vec<&Target>> {
        let start = self.index_of(name)?;
        let mut seen = HashSet::new();
        let mut stack: Vec<NodeIndex> = vec![start];
        let mut dependents = Vec::new();
        while let Some(index) = stack.pop() {
            for next in self.graph.neighbors_directed(index, Direction::Outgoing) {
                if seen.insert(next) {
                    dependents.push(next);
                    stack.push(next);
                }
            }
        }
        dependents.sort();
        Ok(dependents.into_iter().map(|i| &self.graph[i]).collect())
    }

    /// Names of `roots` plus everything they depend on, in declaration order
    pub fn closure(&self, roots: &[String]) -> Result<Vec<String>> {
        let mut selected = HashSet::new();
        for root in roots {
            let target = self.lookup(root)?;
            selected.insert(target.name.clone());
            for dep in self.transitive_dependencies(root)? {
                selected.insert(dep.name.clone());
            }
        }
        Ok(self
            .targets()
            .filter(|t| selected.contains(&t.name))
            .map(|t| t.name.clone())
            .collect())
    }

    fn index_of(&self, name: &str) -> Result<NodeIndex> {
        self.indices
            .get(name)
            .copied()
            .ok_or_else(|| Error::unknown_target(name, None))
    }
}

/// Lazily maps a validated topological order to targets
pub struct BuildOrder<'a> {
    graph: &'a DiGraph<Target, ()>,
    order: std::vec::IntoIter<NodeIndex>,
}

impl<'a> Iterator for BuildOrder<'a> {
    type Item = &'a Target;

    fn next(&mut self) -> Option<Self::Item> {
        self.order.next().map(|index| &self.graph[index])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.order.size_hint()
    }
}

impl ExactSizeIterator for BuildOrder<'_> {}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::target::TargetKind;
    use crate::toolchain::{BuildOptions, ToolchainConfig};
    use camino::Utf8PathBuf;

    /// A target with no sources on disk, for graph-only tests
    pub(crate) fn target(name: &str, deps: &[&str]) -> Target {
        let toolchain_config = ToolchainConfig::default();
        Target {
            name: name.to_string(),
            kind: TargetKind::StaticLibrary,
            sources: vec![Utf8PathBuf::from(format!("/src/{}.c", name))],
            deps: deps.iter().map(|d| d.to_string()).collect(),
            options: BuildOptions::default(),
            toolchain: toolchain_config.instantiate(),
            toolchain_config,
            output: Utf8PathBuf::from(format!("/build/lib{}.a", name)),
            cache: true,
        }
    }

    fn graph(targets: &[(&str, &[&str])]) -> TargetGraph {
        let mut graph = TargetGraph::new();
        for (name, deps) in targets {
            graph.add_target(target(name, deps)).unwrap();
        }
        graph
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_dependencies_before_dependents() {
        let mut graph = graph(&[
            ("app", &["net", "core"]),
            ("net", &["core"]),
            ("core", &[]),
            ("tool", &["core"]),
        ]);

        let order = graph.build_order().unwrap();

        assert_eq!(order.len(), 4);
        assert!(position(&order, "core") < position(&order, "net"));
        assert!(position(&order, "net") < position(&order, "app"));
        assert!(position(&order, "core") < position(&order, "tool"));
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let mut graph = graph(&[("c", &[]), ("a", &[]), ("b", &[]), ("d", &["a"])]);

        let order = graph.build_order().unwrap();

        assert_eq!(order, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_duplicate_target() {
        let mut graph = graph(&[("core", &[])]);

        let result = graph.add_target(target("core", &[]));

        assert!(matches!(result, Err(Error::DuplicateTarget { name }) if name == "core"));
    }

    #[test]
    fn test_unknown_dependency() {
        let mut graph = graph(&[("app", &["missing"])]);

        match graph.build_order() {
            Err(Error::UnknownTarget {
                name,
                referenced_by,
            }) => {
                assert_eq!(name, "missing");
                assert_eq!(referenced_by.as_deref(), Some("app"));
            }
            other => panic!("expected UnknownTarget, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup_unknown() {
        let graph = graph(&[("core", &[])]);

        assert!(graph.lookup("core").is_ok());
        assert!(matches!(
            graph.lookup("nope"),
            Err(Error::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_cycle_names_every_member() {
        // a -> b -> c -> a, plus d depending on the cycle and an unrelated e
        let mut graph = graph(&[
            ("a", &["c"]),
            ("b", &["a"]),
            ("c", &["b"]),
            ("d", &["a"]),
            ("e", &[]),
        ]);

        match graph.build_order() {
            Err(Error::CyclicDependency { targets }) => {
                assert_eq!(targets, vec!["a", "b", "c"]);
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let mut graph = graph(&[("a", &["a"]), ("b", &[])]);

        match graph.build_order() {
            Err(Error::CyclicDependency { targets }) => assert_eq!(targets, vec!["a"]),
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_link_order_and_dependents() {
        let mut graph = graph(&[
            ("core", &[]),
            ("net", &["core"]),
            ("app", &["net", "core"]),
        ]);
        graph.build_order().unwrap();

        let link: Vec<_> = graph
            .transitive_dependencies("app")
            .unwrap()
            .into_iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(link, vec!["net", "core"]);

        let dependents: Vec<_> = graph
            .transitive_dependents("core")
            .unwrap()
            .into_iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(dependents, vec!["net", "app"]);

        let direct: Vec<_> = graph
            .dependents("net")
            .unwrap()
            .into_iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(direct, vec!["app"]);
    }

    #[test]
    fn test_closure_selects_dependencies() {
        let graph = graph(&[
            ("core", &[]),
            ("net", &["core"]),
            ("app", &["net"]),
            ("tool", &[]),
        ]);

        let selected = graph.closure(&["app".to_string()]).unwrap();

        assert_eq!(selected, vec!["core", "net", "app"]);
    }
}
