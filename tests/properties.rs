//! Property tests for the signature-dedup, id-uniqueness, and workflow-state
//! invariants named in the testable-properties section.

use indexmap::IndexMap;
use loomwork::application::services::{DependencyPlan, DependencySolver, Planner, ProvenanceGraph};
use loomwork::application::use_cases::InvalidateItems;
use loomwork::domain::entities::{ComputeModule, Item, ItemInstance, ModuleInput, ProcedureHandle};
use loomwork::domain::value_objects::{ItemInstanceId, JobId, JobSignature};
use loomwork::domain::workflow_state::WorkflowState;
use loomwork::infrastructure::persistence::state_file;
use proptest::prelude::*;
use std::collections::HashSet;

fn single_module_state(n_given: usize) -> (WorkflowState, DependencyPlan) {
    let align = ComputeModule {
        name: "align".to_string(),
        inputs: vec![ModuleInput { item: Item::new("reads"), group_by: None }],
        outputs: vec![Item::new("bam")],
        output_mask: [Item::new("bam")].into_iter().collect(),
        procedure: ProcedureHandle("align.sh".to_string()),
    };
    let mut modules: IndexMap<String, ComputeModule> = IndexMap::new();
    modules.insert("align".to_string(), align);

    let given: HashSet<Item> = [Item::new("reads")].into_iter().collect();
    let plan = DependencySolver::new().solve(&modules, &[Item::new("bam")], &given).unwrap();

    let mut state = WorkflowState::new(modules.into_values().collect()).unwrap();
    for i in 0..n_given {
        state
            .register_given(ItemInstance::given(ItemInstanceId::random(), Item::new("reads"), format!("r{i}")))
            .unwrap();
    }
    (state, plan)
}

proptest! {
    /// Invariant 3: a job signature depends only on the *set* of input ids,
    /// never their order.
    #[test]
    fn signature_is_insensitive_to_input_order(mut ids in prop::collection::vec("[a-f0-9]{12}", 1..8)) {
        let original = JobSignature::compute("m", ids.iter().cloned().map(ItemInstanceId));
        ids.reverse();
        let reversed = JobSignature::compute("m", ids.iter().cloned().map(ItemInstanceId));
        prop_assert_eq!(original, reversed);
    }

    /// Two jobs of different modules never collide on signature even with
    /// identical inputs.
    #[test]
    fn signature_distinguishes_modules(ids in prop::collection::vec("[a-f0-9]{12}", 0..5)) {
        let a = JobSignature::compute("module_a", ids.iter().cloned().map(ItemInstanceId));
        let b = JobSignature::compute("module_b", ids.iter().cloned().map(ItemInstanceId));
        prop_assert_ne!(a, b);
    }

    /// Invariant 1 (id uniqueness is only meaningful if ids are well-formed):
    /// every freshly generated id is lowercase hex of the declared length,
    /// for any number of draws.
    #[test]
    fn generated_ids_are_well_formed_hex(n in 1usize..50) {
        for _ in 0..n {
            let item_id = ItemInstanceId::random();
            let job_id = JobId::random();
            prop_assert_eq!(item_id.0.len(), 12);
            prop_assert_eq!(job_id.0.len(), 6);
            prop_assert!(item_id.0.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
            prop_assert!(job_id.0.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    /// Invariant 2: every produced item instance's `made_by` names a job
    /// that actually exists in state, for any number of given instances and
    /// any subset of the resulting jobs completed.
    #[test]
    fn made_by_always_names_an_existing_job(n_given in 1usize..6, complete_mask in prop::collection::vec(any::<bool>(), 0..6)) {
        let (mut state, plan) = single_module_state(n_given);
        let provenance = ProvenanceGraph::build(state.modules());
        Planner::new().update(&mut state, &plan, &provenance).unwrap();

        let job_ids: Vec<JobId> = state.jobs().map(|j| j.id.clone()).collect();
        for (i, job_id) in job_ids.iter().enumerate() {
            if complete_mask.get(i).copied().unwrap_or(false) {
                state.complete_job(job_id, vec![(Item::new("bam"), format!("{job_id}.bam"))]).unwrap();
            }
        }

        for instance in state.item_instances() {
            if let Some(job_id) = &instance.made_by {
                prop_assert!(state.job(job_id).is_some());
            }
        }
    }

    /// Invariant 4: saving state to disk and loading it back reproduces the
    /// same job and item-instance counts, for any number of given instances
    /// and any subset completed.
    #[test]
    fn save_then_load_preserves_job_and_instance_counts(n_given in 1usize..6, complete_mask in prop::collection::vec(any::<bool>(), 0..6)) {
        let (mut state, plan) = single_module_state(n_given);
        let provenance = ProvenanceGraph::build(state.modules());
        Planner::new().update(&mut state, &plan, &provenance).unwrap();

        let job_ids: Vec<JobId> = state.jobs().map(|j| j.id.clone()).collect();
        for (i, job_id) in job_ids.iter().enumerate() {
            if complete_mask.get(i).copied().unwrap_or(false) {
                state.complete_job(job_id, vec![(Item::new("bam"), format!("{job_id}.bam"))]).unwrap();
            }
        }

        let dir = std::env::temp_dir().join(format!("loomwork-prop-roundtrip-{}-{}", std::process::id(), n_given));
        std::fs::create_dir_all(&dir).unwrap();
        state_file::save(&state, &dir).unwrap();

        let modules: Vec<ComputeModule> = state.modules().values().cloned().collect();
        let reloaded = state_file::load(&dir, modules).unwrap();

        prop_assert_eq!(reloaded.jobs().count(), state.jobs().count());
        prop_assert_eq!(reloaded.item_instances().count(), state.item_instances().count());
        prop_assert_eq!(reloaded.pending_jobs().count(), state.pending_jobs().count());

        std::fs::remove_dir_all(&dir).ok();
    }

    /// Invariant 5: calling `Planner::update` a second time with no new
    /// instances never changes the job count, for any number of given
    /// instances.
    #[test]
    fn update_is_idempotent_with_no_new_instances(n_given in 1usize..8) {
        let (mut state, plan) = single_module_state(n_given);
        let provenance = ProvenanceGraph::build(state.modules());
        let planner = Planner::new();
        planner.update(&mut state, &plan, &provenance).unwrap();
        let first_count = state.jobs().count();

        planner.update(&mut state, &plan, &provenance).unwrap();
        prop_assert_eq!(state.jobs().count(), first_count);
        planner.update(&mut state, &plan, &provenance).unwrap();
        prop_assert_eq!(state.jobs().count(), first_count);
    }

    /// Invariant 6: invalidating a module removes every item instance it
    /// produced, for any number of given instances.
    #[test]
    fn invalidate_removes_every_output_of_the_targeted_module(n_given in 1usize..6) {
        let (mut state, plan) = single_module_state(n_given);
        let provenance = ProvenanceGraph::build(state.modules());
        Planner::new().update(&mut state, &plan, &provenance).unwrap();

        let job_ids: Vec<JobId> = state.jobs().map(|j| j.id.clone()).collect();
        for job_id in &job_ids {
            state.complete_job(job_id, vec![(Item::new("bam"), format!("{job_id}.bam"))]).unwrap();
        }
        prop_assert_eq!(state.item_instances().filter(|i| i.item.key() == "bam").count(), n_given);

        let dir = std::env::temp_dir().join(format!("loomwork-prop-invalidate-{}-{}", std::process::id(), n_given));
        std::fs::create_dir_all(&dir).unwrap();
        let targets: HashSet<Item> = [Item::new("bam")].into_iter().collect();
        InvalidateItems::new().execute(&mut state, &plan, &targets, &dir).unwrap();

        prop_assert_eq!(state.item_instances().filter(|i| i.item.key() == "bam").count(), 0);
        prop_assert_eq!(state.jobs().count(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    /// Invariant 7: a grouped join only fires once every given child under
    /// a root has appeared, for any number of children, and fires exactly
    /// once (not once per child) thereafter.
    #[test]
    fn grouped_join_fires_exactly_once_all_children_are_present(n_children in 1usize..6) {
        use loomwork::domain::entities::InputGroup;

        // "align" takes every "reads" instance given under one "sample"
        // root as a single job, rather than one job per reads instance:
        // the root and its children are all given directly (no upstream
        // module produces either), so the join is the given-children case
        // `InputGroup` exists for, not a job-provenance walk.
        let align = ComputeModule {
            name: "align".to_string(),
            inputs: vec![ModuleInput { item: Item::new("reads"), group_by: Some(Item::new("sample")) }],
            outputs: vec![Item::new("bam")],
            output_mask: [Item::new("bam")].into_iter().collect(),
            procedure: ProcedureHandle("align.sh".to_string()),
        };
        let mut modules: IndexMap<String, ComputeModule> = IndexMap::new();
        modules.insert("align".to_string(), align);

        let given: HashSet<Item> = [Item::new("sample"), Item::new("reads")].into_iter().collect();
        let plan = DependencySolver::new().solve(&modules, &[Item::new("bam")], &given).unwrap();

        let mut state = WorkflowState::new(modules.into_values().collect()).unwrap();
        let mut children: IndexMap<Item, Vec<String>> = IndexMap::new();
        children.insert(Item::new("reads"), (0..n_children).map(|i| format!("r{i}")).collect());
        let group = InputGroup::new((Item::new("sample"), "s1".to_string()), children);
        group.register(&mut state).unwrap();

        let provenance = ProvenanceGraph::build(state.modules());
        let planner = Planner::new();
        planner.update(&mut state, &plan, &provenance).unwrap();
        prop_assert_eq!(state.jobs().filter(|j| j.module == "align").count(), 1);

        let job = state.jobs().find(|j| j.module == "align").unwrap();
        prop_assert_eq!(job.input_ids().len(), n_children);

        planner.update(&mut state, &plan, &provenance).unwrap();
        prop_assert_eq!(state.jobs().filter(|j| j.module == "align").count(), 1);
    }
}
