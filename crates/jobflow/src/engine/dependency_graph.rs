//! Dependency graph derived from job triggers.
//!
//! The engine never needs this graph to schedule work; readiness is polled from
//! triggers every cycle. It exists for the optional pre-flight validation, which
//! rejects jobs whose *required* dependencies form a cycle (such jobs can never
//! become ready).

use std::collections::{HashMap, HashSet};

use crate::trigger::Trigger;

/// A directed graph of required dependencies between jobs.
///
/// Edges point from a job to the jobs it requires. Node order follows insertion order
/// so that reported cycles are deterministic.
#[derive(Debug, Clone, Default)]
pub(crate) struct DependencyGraph {
    order: Vec<String>,
    /// Forward edges: job_id -> jobs it requires
    nodes: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    /// Builds the graph of required dependencies for `(job_id, trigger)` pairs.
    pub(crate) fn from_triggers<'a>(
        jobs: impl IntoIterator<Item = (&'a str, &'a Trigger)>,
    ) -> Self {
        let mut graph = Self::default();
        for (job_id, trigger) in jobs {
            graph.add_node(job_id);
            for dependency in trigger.required_jobs() {
                graph.add_dependency(job_id, dependency);
            }
        }
        graph
    }

    fn add_node(&mut self, job_id: &str) {
        if !self.nodes.contains_key(job_id) {
            self.order.push(job_id.to_string());
            self.nodes.insert(job_id.to_string(), HashSet::new());
        }
    }

    /// Adds an edge: `job_id` requires `depends_on`. Missing nodes are created.
    fn add_dependency(&mut self, job_id: &str, depends_on: &str) {
        self.add_node(job_id);
        self.add_node(depends_on);

        self.nodes
            .entry(job_id.to_string())
            .or_default()
            .insert(depends_on.to_string());
    }

    /// Returns a job that lies on a cycle, searching nodes in insertion order.
    pub(crate) fn find_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        self.order
            .iter()
            .find_map(|node| self.find_cycle_dfs(node, &mut visited, &mut rec_stack))
    }

    /// DFS helper; a node already on the recursion stack closes a back edge.
    fn find_cycle_dfs(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
    ) -> Option<String> {
        if rec_stack.contains(node) {
            return Some(node.to_string());
        }
        if !visited.insert(node.to_string()) {
            return None;
        }
        rec_stack.insert(node.to_string());

        if let Some(deps) = self.nodes.get(node) {
            let mut deps: Vec<&String> = deps.iter().collect();
            deps.sort();
            for dep in deps {
                if let Some(found) = self.find_cycle_dfs(dep, visited, rec_stack) {
                    return Some(found);
                }
            }
        }

        rec_stack.remove(node);
        None
    }
}
