//! Provenance Graph service module
//!
//! Precomputes, for each grouped module input, the path from its `group_by`
//! root item down to the input item itself, through a shared namespace of
//! item keys and module names. At plan time the planner walks that path
//! from a concrete root instance, following `made_by`/reservation links, to
//! collect every descendant instance that should be grouped together for
//! one job.

use crate::domain::entities::ComputeModule;
use crate::domain::value_objects::ItemInstanceId;
use crate::domain::workflow_state::WorkflowState;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// A graph over a single shared namespace of item keys and module names:
/// an item node points at every module that consumes it, a module node
/// points at every item it produces.
#[derive(Debug, Default)]
pub struct ProvenanceGraph {
    children: HashMap<String, Vec<String>>,
}

impl ProvenanceGraph {
    pub fn build(modules: &IndexMap<String, ComputeModule>) -> Self {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for module in modules.values() {
            for input in &module.inputs {
                children
                    .entry(input.item.key().to_string())
                    .or_default()
                    .push(module.name.clone());
            }
            for output in &module.outputs {
                children
                    .entry(module.name.clone())
                    .or_default()
                    .push(output.key().to_string());
            }
        }
        Self { children }
    }

    /// Longest path from `start` to `end`, visiting each node through at
    /// most one route: once a node is reached by any branch it is removed
    /// from consideration for every other branch, even one that would
    /// otherwise reach it by a longer route.
    pub fn find_path(&self, start: &str, end: &str) -> Option<Vec<String>> {
        let mut seen = HashSet::new();
        self.dfs_longest(start, end, &mut seen)
    }

    fn dfs_longest(&self, node: &str, end: &str, seen: &mut HashSet<String>) -> Option<Vec<String>> {
        if node == end {
            return Some(vec![node.to_string()]);
        }
        if !seen.insert(node.to_string()) {
            return None;
        }
        let mut best: Option<Vec<String>> = None;
        if let Some(children) = self.children.get(node) {
            for child in children {
                if let Some(sub) = self.dfs_longest(child, end, seen) {
                    if best.as_ref().map_or(true, |b| sub.len() > b.len()) {
                        best = Some(sub);
                    }
                }
            }
        }
        best.map(|mut p| {
            p.insert(0, node.to_string());
            p
        })
    }

    /// Walks `path` (alternating item keys and module names, as returned by
    /// [`find_path`](Self::find_path)) starting from `root_instance`,
    /// following reservations and job outputs, and returns the instances of
    /// the item named at the end of the path (`path.last()`) that descend
    /// from that root. Only the output bound to that specific item key is
    /// collected at the final hop, never a job's other, unrelated outputs.
    pub fn collect_descendants(
        &self,
        state: &WorkflowState,
        root_instance: &ItemInstanceId,
        path: &[String],
    ) -> Vec<ItemInstanceId> {
        // A root whose own children were recorded directly as given (never
        // produced by any job) has no job-provenance hop at all; check that
        // shortcut before walking the graph.
        if path.len() == 2 {
            let target_key = &path[1];
            let given = state.given_children(root_instance, target_key);
            if !given.is_empty() {
                return given.to_vec();
            }
        }

        let mut frontier = vec![root_instance.clone()];
        let mut i = 0;
        while i + 1 < path.len() {
            let module_node = &path[i + 1];
            let target_key = path.get(i + 2).map(String::as_str);
            let mut next_job_ids: HashSet<_> = HashSet::new();
            for inst in &frontier {
                for job_id in state.reservations_of(inst) {
                    if let Some(job) = state.job(job_id) {
                        if &job.module == module_node {
                            next_job_ids.insert(job_id.clone());
                        }
                    }
                }
            }
            let mut next_frontier = Vec::new();
            for job_id in &next_job_ids {
                if let Some(job) = state.job(job_id) {
                    match target_key {
                        Some(key) => {
                            if let Some(value) = job.outputs.get(key) {
                                next_frontier.extend(value.ids());
                            }
                        }
                        None => next_frontier.extend(job.output_ids()),
                    }
                }
            }
            frontier = next_frontier;
            i += 2;
        }
        frontier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Item, ModuleInput, ProcedureHandle};

    fn module(name: &str, inputs: Vec<(&str, Option<&str>)>, outputs: Vec<&str>) -> ComputeModule {
        ComputeModule {
            name: name.to_string(),
            inputs: inputs
                .into_iter()
                .map(|(item, group_by)| ModuleInput {
                    item: Item::new(item),
                    group_by: group_by.map(Item::new),
                })
                .collect(),
            outputs: outputs.into_iter().map(Item::new).collect(),
            output_mask: Default::default(),
            procedure: ProcedureHandle(format!("{name}.sh")),
        }
    }

    #[test]
    fn finds_a_path_through_two_modules() {
        let mut modules = IndexMap::new();
        modules.insert("align".to_string(), module("align", vec![("sample", None)], vec!["bam"]));
        modules.insert("call".to_string(), module("call", vec![("bam", Some("sample"))], vec!["vcf"]));
        let graph = ProvenanceGraph::build(&modules);
        let path = graph.find_path("sample", "bam").unwrap();
        assert_eq!(path, vec!["sample".to_string(), "align".to_string(), "bam".to_string()]);
    }

    #[test]
    fn no_path_returns_none() {
        let modules: IndexMap<String, ComputeModule> = IndexMap::new();
        let graph = ProvenanceGraph::build(&modules);
        assert!(graph.find_path("a", "z").is_none());
    }
}
