//! Topological wave scheduling.

use crate::errors::GraphError;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Steps that can run in parallel once every earlier group has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepGroup {
    /// Position of the group in the schedule.
    pub index: usize,
    /// Step IDs, in recipe declaration order.
    pub steps: Vec<String>,
}

/// Directed graph of step dependencies.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: IndexSet<String>,
    edges: IndexMap<String, IndexSet<String>>,
    ancestors: HashMap<String, IndexSet<String>>,
}

impl DependencyGraph {
    /// Creates a graph with the given nodes and no edges.
    pub fn new(nodes: impl IntoIterator<Item = String>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true when the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds the edge `from -> to`.
    ///
    /// `to` and all of its descendants inherit `from` and its ancestors.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        if !self
            .edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string())
        {
            return;
        }

        let mut inherited: IndexSet<String> = IndexSet::new();
        inherited.insert(from.to_string());
        if let Some(above) = self.ancestors.get(from) {
            inherited.extend(above.iter().cloned());
        }

        let mut queue = VecDeque::from([to.to_string()]);
        let mut visited = IndexSet::new();
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node.clone()) {
                continue;
            }
            let entry = self.ancestors.entry(node.clone()).or_default();
            entry.extend(inherited.iter().filter(|a| **a != node).cloned());
            if let Some(children) = self.edges.get(&node) {
                queue.extend(children.iter().cloned());
            }
        }
    }

    /// Returns every transitive upstream step of `id`.
    #[must_use]
    pub fn upstream_of(&self, id: &str) -> Vec<String> {
        self.ancestors
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the direct children of `id`.
    #[must_use]
    pub fn children_of(&self, id: &str) -> Vec<String> {
        self.edges
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Sorts the nodes into groups.
    ///
    /// A node lands one group after the last of its parents. Fails when a
    /// cycle, or an edge from an ID that is not a node, leaves nodes
    /// unplaced.
    pub fn sort(&self) -> Result<Vec<StepGroup>, GraphError> {
        if self.nodes.is_empty() {
            return Ok(Vec::new());
        }

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for children in self.edges.values() {
            for child in children {
                *in_degree.entry(child.as_str()).or_default() += 1;
            }
        }

        let mut queue: VecDeque<(&str, usize)> = self
            .nodes
            .iter()
            .filter(|id| in_degree.get(id.as_str()).copied().unwrap_or(0) == 0)
            .map(|id| (id.as_str(), 0))
            .collect();

        let mut groups: Vec<Vec<&str>> = Vec::new();
        let mut placed = 0;
        while let Some((id, group)) = queue.pop_front() {
            if groups.len() <= group {
                groups.resize_with(group + 1, Vec::new);
            }
            groups[group].push(id);
            placed += 1;

            for child in self.edges.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(child.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back((child.as_str(), group + 1));
                    }
                }
            }
        }

        if placed < self.nodes.len() {
            let unplaced = self
                .nodes
                .iter()
                .filter(|id| !groups.iter().any(|g| g.contains(&id.as_str())))
                .cloned()
                .collect();
            return Err(GraphError::not_a_dag(unplaced));
        }

        Ok(groups
            .into_iter()
            .enumerate()
            .map(|(index, mut ids)| {
                ids.sort_by_key(|id| self.nodes.get_index_of(*id));
                StepGroup {
                    index,
                    steps: ids.into_iter().map(str::to_string).collect(),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new(nodes.iter().map(|s| (*s).to_string()));
        for (from, to) in edges {
            g.add_edge(from, to);
        }
        g
    }

    fn ids(groups: &[StepGroup]) -> Vec<Vec<&str>> {
        groups
            .iter()
            .map(|g| g.steps.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_chain_plus_independent() {
        let g = graph(&["A", "B", "C", "D"], &[("A", "B"), ("B", "C")]);
        let groups = g.sort().unwrap();
        assert_eq!(ids(&groups), vec![vec!["A", "D"], vec!["B"], vec!["C"]]);
        assert_eq!(groups[2].index, 2);
    }

    #[test]
    fn test_empty_graph() {
        let g = DependencyGraph::new(Vec::new());
        assert!(g.sort().unwrap().is_empty());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "a"), ("a", "c")]);
        let err = g.sort().unwrap_err();
        assert_eq!(err.to_string(), "not a valid dag");
        assert_eq!(err.steps, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_self_loop_is_rejected() {
        let g = graph(&["a"], &[("a", "a")]);
        assert!(g.sort().is_err());
    }

    #[test]
    fn test_diamond_places_join_after_longest_path() {
        let g = graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "c"), ("a", "d"), ("c", "d")],
        );
        let groups = g.sort().unwrap();
        assert_eq!(ids(&groups), vec![vec!["a"], vec!["b"], vec!["c"], vec!["d"]]);
    }

    #[test]
    fn test_upstream_is_transitive_regardless_of_edge_order() {
        // b -> c is added before a -> b.
        let g = graph(&["a", "b", "c"], &[("b", "c"), ("a", "b")]);
        let mut upstream = g.upstream_of("c");
        upstream.sort();
        assert_eq!(upstream, vec!["a", "b"]);
        assert_eq!(g.upstream_of("b"), vec!["a"]);
        assert!(g.upstream_of("a").is_empty());
    }

    #[test]
    fn test_group_sizes_sum_to_node_count() {
        let g = graph(
            &["a", "b", "c", "d", "e", "f"],
            &[("a", "c"), ("b", "c"), ("c", "e"), ("d", "e"), ("b", "f")],
        );
        let groups = g.sort().unwrap();
        assert_eq!(groups.iter().map(|g| g.steps.len()).sum::<usize>(), 6);

        let group_of = |id: &str| groups.iter().position(|g| g.steps.iter().any(|s| s == id));
        for (from, to) in [("a", "c"), ("b", "c"), ("c", "e"), ("d", "e"), ("b", "f")] {
            assert!(group_of(from) < group_of(to));
        }
    }

    #[test]
    fn test_duplicate_edges_are_ignored() {
        let g = graph(&["a", "b"], &[("a", "b"), ("a", "b")]);
        assert_eq!(g.children_of("a"), vec!["b"]);
        assert_eq!(ids(&g.sort().unwrap()), vec![vec!["a"], vec!["b"]]);
    }
}
