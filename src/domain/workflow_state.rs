//! The `WorkflowState` aggregate: durable, run-scoped bookkeeping of every
//! item instance and job instance the orchestrator knows about.
//!
//! This is the single source of truth the planner reads and writes; it
//! enforces the invariants named in the testable-properties section on
//! every mutation rather than leaving callers to maintain them by hand.

use crate::domain::entities::{ComputeModule, Item, ItemInstance, JobInstance};
use crate::domain::value_objects::{ItemInstanceId, JobId, JobSignature};
use crate::error::{OrchestratorError, Result};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet};

/// Durable, in-memory state of one workflow run.
///
/// Invariants (checked by every mutator, never left to callers):
/// 1. every `ItemInstanceId` and `JobId` is unique within the state;
/// 2. every `ItemInstance::made_by` names a job that exists in `jobs`;
/// 3. every `JobInstance::signature` is unique among `jobs`;
/// 4. `pending_jobs` is a subset of `jobs` and only names incomplete jobs;
/// 5. at most one job produces a given masked output item;
/// 6. reservations only grow, except as a side effect of `invalidate`.
#[derive(Debug, Default)]
pub struct WorkflowState {
    modules: IndexMap<String, ComputeModule>,
    item_instances: HashMap<ItemInstanceId, ItemInstance>,
    jobs: HashMap<JobId, JobInstance>,
    /// Insertion order matters: the supervisor submits pending jobs in this
    /// order.
    pending_jobs: IndexSet<JobId>,
    signatures: HashMap<JobSignature, JobId>,
    /// (module output item key) -> job that is allowed to produce it, for
    /// every item in that module's `output_mask`.
    producers: HashMap<String, JobId>,
    /// instance -> jobs that consumed it as an input. Used by the
    /// provenance graph to walk from a root instance to its grouped
    /// descendants without re-deriving consumption from every job's input
    /// list on every traversal.
    reservations: HashMap<ItemInstanceId, Vec<JobId>>,
    /// root given instance id -> item key -> the given instance ids of its
    /// direct children, recorded when an `InputGroup` links a child's
    /// provenance to its root at registration time. Lets a grouped input
    /// whose root and children are both given (never job-produced) be
    /// matched without a job-provenance path.
    given_groups: HashMap<ItemInstanceId, HashMap<String, Vec<ItemInstanceId>>>,
    pub run_count: u32,
}

impl WorkflowState {
    pub fn new(modules: Vec<ComputeModule>) -> Result<Self> {
        let mut map = IndexMap::new();
        for m in modules {
            if map.contains_key(&m.name) {
                return Err(OrchestratorError::DuplicateModule(m.name));
            }
            map.insert(m.name.clone(), m);
        }
        Ok(Self {
            modules: map,
            ..Default::default()
        })
    }

    pub fn modules(&self) -> &IndexMap<String, ComputeModule> {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<&ComputeModule> {
        self.modules.get(name)
    }

    pub fn item_instance(&self, id: &ItemInstanceId) -> Option<&ItemInstance> {
        self.item_instances.get(id)
    }

    pub fn item_instances(&self) -> impl Iterator<Item = &ItemInstance> {
        self.item_instances.values()
    }

    pub fn job(&self, id: &JobId) -> Option<&JobInstance> {
        self.jobs.get(id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobInstance> {
        self.jobs.values()
    }

    pub fn pending_jobs(&self) -> impl Iterator<Item = &JobId> {
        self.pending_jobs.iter()
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.pending_jobs.is_empty()
    }

    pub fn reservations_of(&self, id: &ItemInstanceId) -> &[JobId] {
        self.reservations.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The full instance -> consuming-jobs index, for persistence
    /// (`item_instance_reservations` in the state file).
    pub fn reservations(&self) -> &HashMap<ItemInstanceId, Vec<JobId>> {
        &self.reservations
    }

    /// Every given (non-produced) item instance id currently known.
    pub fn given_ids(&self) -> impl Iterator<Item = &ItemInstanceId> {
        self.item_instances.values().filter(|i| i.is_given()).map(|i| &i.id)
    }

    pub fn signature_exists(&self, sig: &JobSignature) -> Option<&JobId> {
        self.signatures.get(sig)
    }

    /// Registers a `given` item instance (no producing job). Fails if its id
    /// collides with an existing instance.
    pub fn register_given(&mut self, instance: ItemInstance) -> Result<ItemInstanceId> {
        let id = instance.id.clone();
        if self.item_instances.contains_key(&id) {
            return Err(OrchestratorError::DuplicateItemInstanceId(id));
        }
        self.item_instances.insert(id.clone(), instance);
        Ok(id)
    }

    /// Records that `child` is a direct, given (non-produced) descendant of
    /// `root` under `item_key`, so a grouped input whose root is itself
    /// given can be matched without walking a job-provenance path. See
    /// [`InputGroup`](crate::domain::entities::InputGroup).
    pub fn link_given_child(&mut self, root: &ItemInstanceId, item_key: String, child: ItemInstanceId) {
        self.given_groups.entry(root.clone()).or_default().entry(item_key).or_default().push(child);
    }

    /// The given children of `root` recorded under `item_key`, if any.
    pub fn given_children(&self, root: &ItemInstanceId, item_key: &str) -> &[ItemInstanceId] {
        self.given_groups
            .get(root)
            .and_then(|by_key| by_key.get(item_key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The full given-group index, for persistence.
    pub fn given_groups(&self) -> &HashMap<ItemInstanceId, HashMap<String, Vec<ItemInstanceId>>> {
        &self.given_groups
    }

    /// Registers a new pending job instance, deduping on signature.
    ///
    /// Returns the existing job's id if an identical signature is already
    /// known (invariant 3), otherwise inserts `job` and returns its own id.
    pub fn materialize_job(&mut self, job: JobInstance) -> Result<JobId> {
        if let Some(existing) = self.signatures.get(&job.signature) {
            return Ok(existing.clone());
        }
        let id = job.id.clone();
        if self.jobs.contains_key(&id) {
            return Err(OrchestratorError::DuplicateJobId(id));
        }
        for input in job.input_ids() {
            self.reservations.entry(input).or_default().push(id.clone());
        }
        self.signatures.insert(job.signature.clone(), id.clone());
        self.pending_jobs.insert(id.clone());
        self.jobs.insert(id.clone(), job);
        Ok(id)
    }

    /// Marks `job` complete, registering the item instances it produced.
    ///
    /// `outputs` pairs each produced output item with its concrete value;
    /// items in the module's `output_mask` are checked against invariant 5
    /// (single producer) before being registered.
    pub fn complete_job(
        &mut self,
        job_id: &JobId,
        outputs: Vec<(Item, String)>,
    ) -> Result<Vec<ItemInstanceId>> {
        let job = self
            .jobs
            .get(job_id)
            .ok_or_else(|| OrchestratorError::UnknownJob(job_id.clone()))?
            .clone();
        let module = self
            .modules
            .get(&job.module)
            .expect("job references a module that was removed from state")
            .clone();

        let mut new_ids = Vec::with_capacity(outputs.len());
        let mut keyed_outputs: IndexMap<String, crate::domain::entities::InputValue> = IndexMap::new();
        for (item, value) in outputs {
            if module.output_mask.contains(&item) {
                if let Some(existing) = self.producers.get(item.key()) {
                    if existing != job_id {
                        return Err(OrchestratorError::DuplicateProducer {
                            item: item.key().to_string(),
                            existing: existing.clone(),
                        });
                    }
                } else {
                    self.producers.insert(item.key().to_string(), job_id.clone());
                }
            }
            let id = ItemInstanceId::random();
            let key = item.key().to_string();
            let instance = ItemInstance::produced(id.clone(), item, value, job_id.clone());
            self.item_instances.insert(id.clone(), instance);
            keyed_outputs.insert(key, crate::domain::entities::InputValue::Single(id.clone()));
            new_ids.push(id);
        }

        let job = self.jobs.get_mut(job_id).expect("checked above");
        job.outputs = keyed_outputs;
        job.complete = true;
        self.pending_jobs.shift_remove(job_id);
        Ok(new_ids)
    }

    /// Marks `job` complete with no outputs (executor failure path): the job
    /// leaves `pending_jobs` but produces nothing, per the "treat as
    /// completed-with-empty-manifest" error handling rule.
    pub fn complete_job_failed(&mut self, job_id: &JobId) -> Result<()> {
        let job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| OrchestratorError::UnknownJob(job_id.clone()))?;
        job.complete = true;
        self.pending_jobs.shift_remove(job_id);
        Ok(())
    }

    /// Inserts an already-validated item instance straight into the index,
    /// bypassing the invariant checks `register_given` performs. Used only
    /// while reconstructing state from disk, after the loader's own
    /// fixed-point validation pass has already established the invariants
    /// hold for the file as a whole.
    pub fn restore_item_instance(&mut self, instance: ItemInstance) {
        self.item_instances.insert(instance.id.clone(), instance);
    }

    /// Inserts an already-validated job instance straight into the index.
    /// See [`restore_item_instance`](Self::restore_item_instance).
    pub fn restore_job(&mut self, job: JobInstance) {
        let id = job.id.clone();
        for input in job.input_ids() {
            self.reservations.entry(input).or_default().push(id.clone());
        }
        self.signatures.insert(job.signature.clone(), id.clone());
        if !job.complete {
            self.pending_jobs.insert(id.clone());
        }
        if job.complete {
            if let Some(module) = self.modules.get(&job.module) {
                for output_id in job.output_ids() {
                    if let Some(inst) = self.item_instances.get(&output_id) {
                        if module.output_mask.contains(&inst.item) {
                            self.producers.entry(inst.item.key().to_string()).or_insert_with(|| id.clone());
                        }
                    }
                }
            }
        }
        self.jobs.insert(id, job);
    }

    /// Inserts an already-validated given-group link straight into the
    /// index. See [`restore_item_instance`](Self::restore_item_instance).
    pub fn restore_given_group(&mut self, root: ItemInstanceId, item_key: String, child: ItemInstanceId) {
        self.given_groups.entry(root).or_default().entry(item_key).or_default().push(child);
    }

    /// Computes the set of modules transitively affected by invalidating
    /// `targets`, using `parent_map` (module name or item key -> the module
    /// names that consume it).
    pub fn affected_modules(
        &self,
        targets: &HashSet<String>,
        parent_map: &HashMap<String, Vec<String>>,
    ) -> HashSet<String> {
        let mut affected = HashSet::new();
        let mut todo: Vec<String> = targets.iter().cloned().collect();
        while let Some(node) = todo.pop() {
            if let Some(children) = parent_map.get(&node) {
                for child in children {
                    if affected.insert(child.clone()) {
                        todo.push(child.clone());
                    }
                }
            }
        }
        affected
    }

    /// Removes every job instance of `modules` (and the item instances and
    /// reservations they produced/held), and clears the signature index
    /// for those jobs so equivalent work is rescheduled fresh. Per Design
    /// Notes, this does not touch reservations held by jobs outside
    /// `modules`, even if they reference an instance being removed: a
    /// stale reservation to a removed instance is harmless since the
    /// instance itself is gone.
    pub fn invalidate_modules(&mut self, modules: &HashSet<String>) -> Vec<JobId> {
        let removed_job_ids: Vec<JobId> = self
            .jobs
            .values()
            .filter(|j| modules.contains(&j.module))
            .map(|j| j.id.clone())
            .collect();

        for job_id in &removed_job_ids {
            if let Some(job) = self.jobs.remove(job_id) {
                self.signatures.remove(&job.signature);
                self.pending_jobs.shift_remove(job_id);
                for out in job.output_ids() {
                    self.item_instances.remove(&out);
                }
                for input in job.input_ids() {
                    if let Some(list) = self.reservations.get_mut(&input) {
                        list.retain(|j| j != job_id);
                    }
                }
            }
            self.producers.retain(|_, v| v != job_id);
        }
        removed_job_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ProcedureHandle;

    fn module(name: &str) -> ComputeModule {
        ComputeModule {
            name: name.to_string(),
            inputs: vec![],
            outputs: vec![Item::new("out")],
            output_mask: [Item::new("out")].into_iter().collect(),
            procedure: ProcedureHandle(format!("{name}.sh")),
        }
    }

    #[test]
    fn duplicate_module_names_are_rejected() {
        let err = WorkflowState::new(vec![module("a"), module("a")]).unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateModule(_)));
    }

    #[test]
    fn materialize_job_dedups_on_signature() {
        let mut state = WorkflowState::new(vec![module("a")]).unwrap();
        let sig = JobSignature::compute("a", vec![]);
        let j1 = JobInstance::new(JobId("111111".into()), "a".into(), IndexMap::new(), sig.clone());
        let j2 = JobInstance::new(JobId("222222".into()), "a".into(), IndexMap::new(), sig);
        let id1 = state.materialize_job(j1).unwrap();
        let id2 = state.materialize_job(j2).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(state.jobs().count(), 1);
    }

    #[test]
    fn complete_job_enforces_single_producer_for_masked_output() {
        let mut state = WorkflowState::new(vec![module("a")]).unwrap();
        let sig1 = JobSignature::compute("a", vec![ItemInstanceId("x".into())]);
        let sig2 = JobSignature::compute("a", vec![ItemInstanceId("y".into())]);
        let j1 = JobInstance::new(JobId("111111".into()), "a".into(), IndexMap::new(), sig1);
        let j2 = JobInstance::new(JobId("222222".into()), "a".into(), IndexMap::new(), sig2);
        state.materialize_job(j1).unwrap();
        state.materialize_job(j2).unwrap();

        state
            .complete_job(&JobId("111111".into()), vec![(Item::new("out"), "v1".into())])
            .unwrap();
        let err = state
            .complete_job(&JobId("222222".into()), vec![(Item::new("out"), "v2".into())])
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateProducer { .. }));
    }

    #[test]
    fn invalidate_modules_removes_jobs_and_their_outputs() {
        let mut state = WorkflowState::new(vec![module("a")]).unwrap();
        let sig = JobSignature::compute("a", vec![]);
        let job = JobInstance::new(JobId("111111".into()), "a".into(), IndexMap::new(), sig);
        state.materialize_job(job).unwrap();
        state
            .complete_job(&JobId("111111".into()), vec![(Item::new("out"), "v".into())])
            .unwrap();
        assert_eq!(state.jobs().count(), 1);

        let removed = state.invalidate_modules(&["a".to_string()].into_iter().collect());
        assert_eq!(removed.len(), 1);
        assert_eq!(state.jobs().count(), 0);
        assert_eq!(state.item_instances().count(), 0);
    }

    #[test]
    fn complete_job_failed_clears_pending_without_producing_outputs() {
        let mut state = WorkflowState::new(vec![module("a")]).unwrap();
        let sig = JobSignature::compute("a", vec![]);
        let job = JobInstance::new(JobId("111111".into()), "a".into(), IndexMap::new(), sig);
        state.materialize_job(job).unwrap();
        assert_eq!(state.pending_jobs().count(), 1);

        state.complete_job_failed(&JobId("111111".into())).unwrap();
        assert_eq!(state.pending_jobs().count(), 0);
        assert!(state.job(&JobId("111111".into())).unwrap().complete);
        assert_eq!(state.item_instances().count(), 0);
    }
}
