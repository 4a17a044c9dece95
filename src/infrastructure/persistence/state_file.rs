//! `workflow_state.json` (de)serialization.
//!
//! This is an external interface contract, not an internal implementation
//! detail: the schema below (modules / parent_map / module_executions /
//! completed_modules / item_instances / given / item_instance_reservations
//! / pending_jobs) is what other tooling reading a workspace's state file
//! is expected to find.
//!
//! Loading is an iterative fixed-point reconstruction: a given item
//! instance or a job with no unresolved inputs resolves immediately; every
//! other item instance or job resolves once whatever it depends on has
//! resolved. A pass that makes no progress while entries remain unresolved
//! means the file references something that was never written, which is
//! corruption rather than a normal partial run.

use crate::domain::entities::{ComputeModule, InputValue, Item, ItemInstance, JobInstance};
use crate::domain::value_objects::{ItemInstanceId, JobId, JobSignature};
use crate::domain::workflow_state::WorkflowState;
use crate::error::{OrchestratorError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const STATE_FILE_NAME: &str = "workflow_state.json";

#[derive(Debug, Serialize, Deserialize)]
struct InputShape {
    item: String,
    #[serde(default)]
    group_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModuleRecord {
    name: String,
    inputs: Vec<InputShape>,
    outputs: Vec<String>,
    /// Declared outputs outside the module's `output_mask` -- not subject
    /// to the single-producer invariant.
    unused_out: Vec<String>,
}

impl ModuleRecord {
    fn of(module: &ComputeModule) -> Self {
        Self {
            name: module.name.clone(),
            inputs: module
                .inputs
                .iter()
                .map(|i| InputShape {
                    item: i.item.key().to_string(),
                    group_by: i.group_by.as_ref().map(|g| g.key().to_string()),
                })
                .collect(),
            outputs: module.outputs.iter().map(|o| o.key().to_string()).collect(),
            unused_out: module
                .outputs
                .iter()
                .filter(|o| !module.output_mask.contains(o))
                .map(|o| o.key().to_string())
                .collect(),
        }
    }

    fn input_keys(&self) -> Vec<String> {
        self.inputs.iter().map(|i| i.item.clone()).collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    id: String,
    complete: bool,
    inputs: IndexMap<String, InputValue>,
    outputs: IndexMap<String, InputValue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ItemInstanceRecord {
    id: String,
    value: String,
    #[serde(default)]
    made_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFileData {
    modules: Vec<ModuleRecord>,
    parent_map: HashMap<String, Vec<String>>,
    module_executions: IndexMap<String, Vec<JobRecord>>,
    completed_modules: Vec<String>,
    item_instances: IndexMap<String, Vec<ItemInstanceRecord>>,
    given: Vec<String>,
    item_instance_reservations: HashMap<String, Vec<String>>,
    pending_jobs: Vec<String>,
    /// Not part of the external field list above: the given-group links an
    /// `InputGroup` records at registration time, needed to round-trip that
    /// feature across a save/load cycle.
    #[serde(default)]
    given_groups: HashMap<String, HashMap<String, Vec<String>>>,
    run_count: u32,
}

/// Module name -> the names of every module that directly consumes one of
/// its declared outputs. Derivable purely from declared modules, not from
/// run-scoped state; recomputed fresh on every save rather than trusted
/// from a previous file.
fn compute_parent_map(modules: &IndexMap<String, ComputeModule>) -> HashMap<String, Vec<String>> {
    let mut producer_of: HashMap<&str, &str> = HashMap::new();
    for module in modules.values() {
        for output in &module.outputs {
            producer_of.insert(output.key(), module.name.as_str());
        }
    }
    let mut parent_map: HashMap<String, Vec<String>> = HashMap::new();
    for module in modules.values() {
        for input in &module.inputs {
            if let Some(&producer) = producer_of.get(input.item.key()) {
                parent_map.entry(producer.to_string()).or_default().push(module.name.clone());
            }
        }
    }
    parent_map
}

pub fn save(state: &WorkflowState, workspace: &Path) -> Result<()> {
    let mut module_executions: IndexMap<String, Vec<JobRecord>> = state.modules().keys().map(|name| (name.clone(), Vec::new())).collect();
    let mut completed_modules: HashSet<String> = HashSet::new();
    let mut module_has_jobs: HashSet<String> = HashSet::new();
    for job in state.jobs() {
        module_has_jobs.insert(job.module.clone());
        module_executions.entry(job.module.clone()).or_default().push(JobRecord {
            id: job.id.0.clone(),
            complete: job.complete,
            inputs: job.inputs.clone(),
            outputs: job.outputs.clone(),
        });
    }
    for name in &module_has_jobs {
        let all_complete = state.jobs().filter(|j| &j.module == name).all(|j| j.complete);
        if all_complete {
            completed_modules.insert(name.clone());
        }
    }

    let mut item_instances: IndexMap<String, Vec<ItemInstanceRecord>> = IndexMap::new();
    let mut given = Vec::new();
    for inst in state.item_instances() {
        if inst.is_given() {
            given.push(inst.id.0.clone());
        }
        item_instances.entry(inst.item.key().to_string()).or_default().push(ItemInstanceRecord {
            id: inst.id.0.clone(),
            value: inst.value.clone(),
            made_by: inst.made_by.as_ref().map(|j| j.0.clone()),
        });
    }

    let item_instance_reservations: HashMap<String, Vec<String>> = state
        .reservations()
        .iter()
        .map(|(id, jobs)| (id.0.clone(), jobs.iter().map(|j| j.0.clone()).collect()))
        .collect();

    let given_groups: HashMap<String, HashMap<String, Vec<String>>> = state
        .given_groups()
        .iter()
        .map(|(root, by_key)| {
            let by_key: HashMap<String, Vec<String>> = by_key.iter().map(|(k, ids)| (k.clone(), ids.iter().map(|i| i.0.clone()).collect())).collect();
            (root.0.clone(), by_key)
        })
        .collect();

    let data = StateFileData {
        modules: state.modules().values().map(ModuleRecord::of).collect(),
        parent_map: compute_parent_map(state.modules()),
        module_executions,
        completed_modules: completed_modules.into_iter().collect(),
        item_instances,
        given,
        item_instance_reservations,
        pending_jobs: state.pending_jobs().map(|j| j.0.clone()).collect(),
        given_groups,
        run_count: state.run_count,
    };
    let json = serde_json::to_string_pretty(&data)?;

    let path = workspace.join(STATE_FILE_NAME);
    let tmp_path = workspace.join(format!("{STATE_FILE_NAME}.tmp"));
    std::fs::write(&tmp_path, json).map_err(|source| OrchestratorError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    std::fs::rename(&tmp_path, &path).map_err(|source| OrchestratorError::Io { path, source })?;
    Ok(())
}

/// Loads state from `workspace/workflow_state.json`, or a fresh empty state
/// if the file does not exist yet. `modules` is the currently declared
/// module set; its shape is checked against whatever the file recorded for
/// modules it already knows about.
pub fn load(workspace: &Path, modules: Vec<ComputeModule>) -> Result<WorkflowState> {
    let path = workspace.join(STATE_FILE_NAME);
    if !path.exists() {
        return WorkflowState::new(modules);
    }
    let bytes = std::fs::read(&path).map_err(|source| OrchestratorError::Io { path: path.clone(), source })?;
    let data: StateFileData = serde_json::from_slice(&bytes)?;

    for record in &data.modules {
        if let Some(module) = modules.iter().find(|m| m.name == record.name) {
            let expected = ModuleRecord::of(module);
            if expected.input_keys() != record.input_keys() || expected.outputs != record.outputs {
                return Err(OrchestratorError::ModuleShapeMismatch {
                    module: record.name.clone(),
                    expected: expected.outputs,
                    found: record.outputs.clone(),
                });
            }
        }
    }

    let mut state = WorkflowState::new(modules)?;
    state.run_count = data.run_count;

    let items: Vec<ItemInstance> = data
        .item_instances
        .into_iter()
        .flat_map(|(key, records)| {
            let item = Item::new(key);
            records.into_iter().map(move |r| ItemInstance {
                id: ItemInstanceId(r.id),
                item: item.clone(),
                value: r.value,
                made_by: r.made_by.map(JobId),
            })
        })
        .collect();

    let jobs: Vec<JobInstance> = data
        .module_executions
        .into_iter()
        .flat_map(|(module, records)| {
            records.into_iter().map(move |r| {
                let all_ids: Vec<ItemInstanceId> = r.inputs.values().flat_map(InputValue::ids).collect();
                let signature = JobSignature::compute(&module, all_ids);
                JobInstance {
                    id: JobId(r.id),
                    module: module.clone(),
                    inputs: r.inputs,
                    outputs: r.outputs,
                    signature,
                    complete: r.complete,
                }
            })
        })
        .collect();

    reconstruct(&mut state, items, jobs)?;

    for (root, by_key) in data.given_groups {
        for (key, children) in by_key {
            for child in children {
                state.restore_given_group(ItemInstanceId(root.clone()), key.clone(), ItemInstanceId(child));
            }
        }
    }

    Ok(state)
}

fn reconstruct(state: &mut WorkflowState, mut items: Vec<ItemInstance>, mut jobs: Vec<JobInstance>) -> Result<()> {
    let mut resolved_items: HashSet<ItemInstanceId> = HashSet::new();
    let mut resolved_jobs: HashSet<JobId> = HashSet::new();

    loop {
        let mut progress = false;

        let (ready_items, pending_items): (Vec<_>, Vec<_>) = items.into_iter().partition(|inst| {
            inst.made_by.as_ref().map_or(true, |job| resolved_jobs.contains(job))
        });
        for inst in ready_items {
            progress = true;
            resolved_items.insert(inst.id.clone());
            state.restore_item_instance(inst);
        }
        items = pending_items;

        let (ready_jobs, pending_jobs): (Vec<_>, Vec<_>) = jobs
            .into_iter()
            .partition(|job| job.input_ids().iter().all(|input| resolved_items.contains(input)));
        for job in ready_jobs {
            progress = true;
            resolved_jobs.insert(job.id.clone());
            state.restore_job(job);
        }
        jobs = pending_jobs;

        if items.is_empty() && jobs.is_empty() {
            break;
        }
        if !progress {
            return Err(OrchestratorError::CorruptState {
                remaining: items.len() + jobs.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{InputValue, ProcedureHandle};

    fn sample_module() -> ComputeModule {
        ComputeModule {
            name: "align".to_string(),
            inputs: vec![],
            outputs: vec![Item::new("bam")],
            output_mask: [Item::new("bam")].into_iter().collect(),
            procedure: ProcedureHandle("align.sh".to_string()),
        }
    }

    #[test]
    fn save_then_load_round_trips_state() {
        let dir = std::env::temp_dir().join(format!("loomwork-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut state = WorkflowState::new(vec![sample_module()]).unwrap();
        let given = ItemInstance::given(ItemInstanceId("abcdef012345".into()), Item::new("sample"), "s1".into());
        state.register_given(given).unwrap();
        let mut inputs = IndexMap::new();
        inputs.insert("sample".to_string(), InputValue::Single(ItemInstanceId("abcdef012345".into())));
        let sig = JobSignature::compute("align", vec![ItemInstanceId("abcdef012345".into())]);
        let job = JobInstance::new(JobId("111111".into()), "align".into(), inputs, sig);
        state.materialize_job(job).unwrap();

        save(&state, &dir).unwrap();
        let reloaded = load(&dir, vec![sample_module()]).unwrap();
        assert_eq!(reloaded.jobs().count(), 1);
        assert_eq!(reloaded.item_instances().count(), 1);
        assert_eq!(reloaded.jobs().next().unwrap().inputs.len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn corrupt_state_with_dangling_made_by_is_rejected() {
        let dir = std::env::temp_dir().join(format!("loomwork-corrupt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let dangling = ItemInstanceRecord {
            id: "abcdef012345".to_string(),
            value: "v".to_string(),
            made_by: Some("ffffff".to_string()),
        };
        let mut item_instances = IndexMap::new();
        item_instances.insert("bam".to_string(), vec![dangling]);
        let data = StateFileData {
            modules: vec![ModuleRecord::of(&sample_module())],
            parent_map: HashMap::new(),
            module_executions: IndexMap::new(),
            completed_modules: Vec::new(),
            item_instances,
            given: Vec::new(),
            item_instance_reservations: HashMap::new(),
            pending_jobs: Vec::new(),
            given_groups: HashMap::new(),
            run_count: 0,
        };
        std::fs::write(dir.join(STATE_FILE_NAME), serde_json::to_string_pretty(&data).unwrap()).unwrap();

        let err = load(&dir, vec![sample_module()]).unwrap_err();
        assert!(matches!(err, OrchestratorError::CorruptState { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }
}
