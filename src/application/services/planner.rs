//! Planner service module
//!
//! `Planner::update` is the namespace-construction step: for every module in
//! dependency order, it matches currently available item instances against
//! the module's declared inputs (cross-product for ungrouped inputs, a
//! provenance-graph join for grouped ones) and materializes one job
//! instance per resulting combination, deduped by signature. Each
//! combination is kept as a namespace keyed by input item key, so a
//! module's procedure (and the signature computation below) can always tell
//! which instance belongs to which declared input.

use super::{DependencyPlan, ProvenanceGraph};
use crate::domain::entities::{ComputeModule, InputValue};
use crate::domain::value_objects::{ItemInstanceId, JobId, JobSignature};
use crate::domain::workflow_state::WorkflowState;
use crate::error::Result;
use indexmap::IndexMap;
use std::collections::HashMap;

#[derive(Default)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Materializes every job instance reachable from the currently known
    /// item instances, in plan order. Idempotent: re-running after new
    /// instances appear only adds jobs for combinations not already
    /// present (by signature).
    pub fn update(&self, state: &mut WorkflowState, plan: &DependencyPlan, provenance: &ProvenanceGraph) -> Result<()> {
        for module_name in &plan.order {
            let module = state
                .module(module_name)
                .cloned()
                .expect("plan only names declared modules");
            self.update_module(state, provenance, &module)?;
        }
        Ok(())
    }

    fn update_module(
        &self,
        state: &mut WorkflowState,
        provenance: &ProvenanceGraph,
        module: &ComputeModule,
    ) -> Result<()> {
        let ungrouped_keys: Vec<String> = module.ungrouped_inputs().map(|i| i.item.key().to_string()).collect();
        let ungrouped_lists: Vec<Vec<ItemInstanceId>> = module
            .ungrouped_inputs()
            .map(|input| {
                state
                    .item_instances()
                    .filter(|inst| inst.item == input.item)
                    .map(|inst| inst.id.clone())
                    .collect()
            })
            .collect();
        if ungrouped_lists.iter().any(Vec::is_empty) {
            return Ok(());
        }
        let ungrouped_combos: Vec<Vec<ItemInstanceId>> = cartesian_product(&ungrouped_lists);

        // Group grouped inputs by their root item, so inputs sharing a root
        // are joined together (merged) under the same root instance rather
        // than cross-producted against each other.
        let mut roots: Vec<&crate::domain::entities::Item> = Vec::new();
        let mut by_root: HashMap<&str, Vec<&crate::domain::entities::ModuleInput>> = HashMap::new();
        for input in module.grouped_inputs() {
            let root = input.group_by.as_ref().unwrap();
            by_root.entry(root.key()).or_insert_with(|| {
                roots.push(root);
                Vec::new()
            });
            by_root.get_mut(root.key()).unwrap().push(input);
        }

        if roots.is_empty() {
            for ungrouped in &ungrouped_combos {
                let namespace = namespace_from(&ungrouped_keys, ungrouped);
                self.materialize(state, module, namespace)?;
            }
            return Ok(());
        }

        // For each root item, one namespace fragment per root instance that
        // has every grouped input under it satisfied.
        let mut per_root_combos: Vec<Vec<IndexMap<String, InputValue>>> = Vec::new();
        for root in &roots {
            let root_instances: Vec<ItemInstanceId> = state
                .item_instances()
                .filter(|inst| &inst.item == *root)
                .map(|inst| inst.id.clone())
                .collect();

            let inputs_for_root = &by_root[root.key()];
            let mut combos_for_root: Vec<IndexMap<String, InputValue>> = Vec::new();
            for root_instance in &root_instances {
                let mut fragment: IndexMap<String, InputValue> = IndexMap::new();
                let mut any_empty = false;
                for input in inputs_for_root {
                    // No module-provenance path exists when the grouped
                    // input is itself given directly alongside its root
                    // (never produced by any job): fall back to the direct
                    // root -> item path, which `collect_descendants` resolves
                    // via the given-children index instead of a job walk.
                    let path = provenance
                        .find_path(root.key(), input.item.key())
                        .unwrap_or_else(|| vec![root.key().to_string(), input.item.key().to_string()]);
                    let descendants = provenance.collect_descendants(state, root_instance, &path);
                    if descendants.is_empty() {
                        any_empty = true;
                        break;
                    }
                    fragment.insert(input.item.key().to_string(), InputValue::List(descendants));
                }
                if !any_empty {
                    combos_for_root.push(fragment);
                }
            }
            if combos_for_root.is_empty() {
                return Ok(());
            }
            per_root_combos.push(combos_for_root);
        }
        let root_combos = cartesian_product(&per_root_combos);

        let ungrouped_iter: Vec<Vec<ItemInstanceId>> = if ungrouped_combos.is_empty() {
            vec![Vec::new()]
        } else {
            ungrouped_combos
        };

        for root_combo in &root_combos {
            for ungrouped in &ungrouped_iter {
                let mut namespace = namespace_from(&ungrouped_keys, ungrouped);
                for fragment in root_combo {
                    for (key, value) in fragment {
                        namespace.insert(key.clone(), value.clone());
                    }
                }
                self.materialize(state, module, namespace)?;
            }
        }
        Ok(())
    }

    fn materialize(&self, state: &mut WorkflowState, module: &ComputeModule, inputs: IndexMap<String, InputValue>) -> Result<()> {
        let all_ids: Vec<ItemInstanceId> = inputs.values().flat_map(InputValue::ids).collect();
        let signature = JobSignature::compute(&module.name, all_ids);
        if state.signature_exists(&signature).is_some() {
            return Ok(());
        }
        let id = unique_job_id(state);
        let job = crate::domain::entities::JobInstance::new(id, module.name.clone(), inputs, signature);
        state.materialize_job(job)?;
        Ok(())
    }
}

/// Zips a fixed key order with one combination of ids into a namespace of
/// single-valued (ungrouped) inputs.
fn namespace_from(keys: &[String], ids: &[ItemInstanceId]) -> IndexMap<String, InputValue> {
    keys.iter()
        .cloned()
        .zip(ids.iter().cloned())
        .map(|(key, id)| (key, InputValue::Single(id)))
        .collect()
}

fn unique_job_id(state: &WorkflowState) -> JobId {
    loop {
        let id = JobId::random();
        if state.job(&id).is_none() {
            return id;
        }
    }
}

fn cartesian_product<T: Clone>(lists: &[Vec<T>]) -> Vec<Vec<T>> {
    let mut result: Vec<Vec<T>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(result.len() * list.len().max(1));
        for prefix in &result {
            for item in list {
                let mut combo = prefix.clone();
                combo.push(item.clone());
                next.push(combo);
            }
        }
        result = next;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cartesian_product_of_empty_lists_is_single_empty_combo() {
        let lists: Vec<Vec<u32>> = vec![];
        assert_eq!(cartesian_product(&lists), vec![Vec::<u32>::new()]);
    }

    #[test]
    fn cartesian_product_multiplies_lists() {
        let lists = vec![vec![1, 2], vec![10, 20]];
        let product = cartesian_product(&lists);
        assert_eq!(product.len(), 4);
        assert!(product.contains(&vec![1, 10]));
        assert!(product.contains(&vec![2, 20]));
    }
}
