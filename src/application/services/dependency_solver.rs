//! Dependency Solver service module
//!
//! Given a set of target items and the items given up front, this walks the
//! declared module graph backward from the targets and produces a
//! deterministic, topologically-ordered execution plan: the minimal set of
//! modules needed, ordered so that every module's non-given inputs are
//! produced by an earlier module.

use crate::domain::entities::{ComputeModule, Item};
use crate::error::{OrchestratorError, Result};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// A solved, orderable execution plan over a subset of the declared modules.
#[derive(Debug, Clone)]
pub struct DependencyPlan {
    /// Modules needed to reach the targets, in execution order. Ties
    /// (modules with no ordering constraint between them) are broken
    /// alphabetically by name so the same inputs always produce the same
    /// plan.
    pub order: Vec<String>,
    /// module name -> the names of every module transitively upstream of
    /// it within this plan (used for group_by feasibility and for
    /// invalidation's forward cascade via the inverse map).
    pub dep_map: HashMap<String, HashSet<String>>,
}

#[derive(Default)]
pub struct DependencySolver;

impl DependencySolver {
    pub fn new() -> Self {
        Self
    }

    /// Solves for a plan reaching every item in `targets`.
    ///
    /// `given` names the items available without running any module.
    /// Fails with [`OrchestratorError::MissingTarget`] if a target is
    /// neither given nor produced by any declared module, with
    /// [`OrchestratorError::NoPlan`] if the needed modules form a cycle,
    /// and with [`OrchestratorError::InvalidGrouping`] if a module groups
    /// an input by an item that is not upstream of it.
    pub fn solve(
        &self,
        modules: &IndexMap<String, ComputeModule>,
        targets: &[Item],
        given: &HashSet<Item>,
    ) -> Result<DependencyPlan> {
        let producer_of = Self::build_producer_index(modules);

        let mut needed: HashSet<String> = HashSet::new();
        let mut todo: VecDeque<Item> = targets.iter().cloned().collect();
        let mut seen_items: HashSet<Item> = targets.iter().cloned().collect();

        while let Some(item) = todo.pop_front() {
            if given.contains(&item) {
                continue;
            }
            let Some(module_name) = producer_of.get(item.key()) else {
                return Err(OrchestratorError::MissingTarget(item.key().to_string()));
            };
            if needed.insert(module_name.clone()) {
                let module = &modules[module_name];
                for input in &module.inputs {
                    if seen_items.insert(input.item.clone()) {
                        todo.push_back(input.item.clone());
                    }
                }
            }
        }

        let order = Self::topological_order(modules, &needed, &producer_of)?;
        let dep_map = Self::transitive_dep_map(modules, &needed, &producer_of);

        Ok(DependencyPlan { order, dep_map })
    }

    fn build_producer_index(modules: &IndexMap<String, ComputeModule>) -> HashMap<String, String> {
        let mut producer_of = HashMap::new();
        for module in modules.values() {
            for output in &module.outputs {
                producer_of.insert(output.key().to_string(), module.name.clone());
            }
        }
        producer_of
    }

    /// Kahn's algorithm restricted to `needed`, breaking ties by picking the
    /// alphabetically smallest ready module at each step.
    fn topological_order(
        modules: &IndexMap<String, ComputeModule>,
        needed: &HashSet<String>,
        producer_of: &HashMap<String, String>,
    ) -> Result<Vec<String>> {
        let mut indegree: HashMap<&str, usize> = needed.iter().map(|n| (n.as_str(), 0)).collect();
        let mut downstream: HashMap<&str, Vec<&str>> = needed.iter().map(|n| (n.as_str(), Vec::new())).collect();

        for name in needed {
            let module = &modules[name];
            for input in &module.inputs {
                if let Some(upstream) = producer_of.get(input.item.key()) {
                    if needed.contains(upstream) && upstream != name {
                        downstream.get_mut(upstream.as_str()).unwrap().push(name.as_str());
                        *indegree.get_mut(name.as_str()).unwrap() += 1;
                    }
                }
            }
        }

        let mut ready: BTreeSet<&str> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut order = Vec::with_capacity(needed.len());

        while let Some(&name) = ready.iter().next() {
            ready.remove(name);
            order.push(name.to_string());
            for &next in &downstream[name] {
                let d = indegree.get_mut(next).unwrap();
                *d -= 1;
                if *d == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() != needed.len() {
            return Err(OrchestratorError::NoPlan {
                targets: needed.iter().cloned().collect(),
                reason: "module graph contains a cycle".to_string(),
            });
        }
        Ok(order)
    }

    fn transitive_dep_map(
        modules: &IndexMap<String, ComputeModule>,
        needed: &HashSet<String>,
        producer_of: &HashMap<String, String>,
    ) -> HashMap<String, HashSet<String>> {
        let mut direct_upstream: HashMap<&str, HashSet<&str>> = HashMap::new();
        for name in needed {
            let module = &modules[name];
            let mut ups = HashSet::new();
            for input in &module.inputs {
                if let Some(u) = producer_of.get(input.item.key()) {
                    if needed.contains(u) {
                        ups.insert(u.as_str());
                    }
                }
            }
            direct_upstream.insert(name.as_str(), ups);
        }

        let mut result: HashMap<String, HashSet<String>> = HashMap::new();
        for name in needed {
            let mut visited: HashSet<&str> = HashSet::new();
            let mut stack: Vec<&str> = direct_upstream[name.as_str()].iter().copied().collect();
            while let Some(u) = stack.pop() {
                if visited.insert(u) {
                    stack.extend(direct_upstream[u].iter().copied());
                }
            }
            result.insert(name.clone(), visited.into_iter().map(String::from).collect());
        }
        result
    }

    /// Checks that every grouped input's `group_by` root is reachable: a
    /// module's own input, a given item, or produced by a module upstream
    /// of it in `plan`. A distinct pass over an already-solved plan, run by
    /// the use case after `solve` rather than folded into it, so a caller
    /// that only needs ordering (e.g. invalidation, which builds a plan over
    /// every declared module just to get `dep_map`) isn't forced through a
    /// feasibility check that doesn't apply to its given set.
    pub fn check_feasible(
        modules: &IndexMap<String, ComputeModule>,
        plan: &DependencyPlan,
        given: &HashSet<Item>,
    ) -> Result<()> {
        let given_keys: HashSet<&str> = given.iter().map(|i| i.key()).collect();
        for name in &plan.order {
            let module = &modules[name];
            for input in module.grouped_inputs() {
                let group_by = input.group_by.as_ref().unwrap();
                let is_own_input = module.inputs.iter().any(|i| &i.item == group_by);
                let is_given = given_keys.contains(group_by.key());
                let is_upstream_output = plan.dep_map[name].iter().any(|up| modules[up].produces(group_by));
                if !(is_own_input || is_given || is_upstream_output) {
                    return Err(OrchestratorError::InvalidGrouping {
                        module: name.clone(),
                        input: input.item.key().to_string(),
                        group_by: group_by.key().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
