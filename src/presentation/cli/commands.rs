//! CLI Commands module
//!
//! Thin glue between the clap subcommands and the application use cases:
//! loads modules and state, runs a use case, persists the result, and
//! reports a summary to the console.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::application::use_cases::run_workflow::RunParams;
use crate::application::use_cases::{BuildPlan, InvalidateItems, RunWorkflow};
use crate::domain::entities::{Item, InputGroup};
use crate::domain::repositories::ModuleLoader;
use crate::infrastructure::config::Config;
use crate::infrastructure::executor::ShellExecutor;
use crate::infrastructure::module_loader::JsonModuleLoader;
use crate::infrastructure::persistence::state_file;
use indexmap::IndexMap;
use serde::Deserialize;

/// One entry of the given-values file: a root item value plus, optionally,
/// the values of items grouped under it (e.g. a sample's reads). Mirrors
/// [`InputGroup`] directly so the file can be registered with no further
/// translation.
#[derive(Debug, Deserialize)]
struct GivenGroupDescriptor {
    item: String,
    value: String,
    #[serde(default)]
    children: IndexMap<String, Vec<String>>,
}

pub struct PlanCommand;

impl PlanCommand {
    pub fn execute(workspace: &Path, modules_dir: &Path, targets: &[String]) -> Result<()> {
        let modules = JsonModuleLoader::new().load_all(modules_dir).context("loading module descriptors")?;
        let module_map = crate::domain::workflow_state::WorkflowState::new(modules.clone())?;

        let given: HashSet<Item> = module_map
            .modules()
            .values()
            .flat_map(|m| m.ungrouped_inputs().chain(m.grouped_inputs()))
            .filter(|i| !modules.iter().any(|m| m.produces(&i.item)))
            .map(|i| i.item.clone())
            .collect();

        let target_items: Vec<Item> = targets.iter().map(|t| Item::new(t.as_str())).collect();
        let plan = BuildPlan::new().execute(module_map.modules(), &target_items, &given)?;

        println!("Execution plan ({} modules):", plan.order.len());
        for (i, module) in plan.order.iter().enumerate() {
            println!("  {:>2}. {module}", i + 1);
        }
        info!(workspace = %workspace.display(), "plan computed");
        Ok(())
    }
}

pub struct RunCommand;

impl RunCommand {
    pub async fn execute(workspace: &Path, modules_dir: &Path, targets: &[String], given_file: &Path) -> Result<()> {
        std::fs::create_dir_all(workspace).with_context(|| format!("creating {}", workspace.display()))?;

        let modules = JsonModuleLoader::new().load_all(modules_dir).context("loading module descriptors")?;
        let mut state = state_file::load(workspace, modules.clone()).context("loading workflow state")?;

        let descriptors: Vec<GivenGroupDescriptor> = {
            let bytes = std::fs::read(given_file).with_context(|| format!("reading {}", given_file.display()))?;
            serde_json::from_slice(&bytes).context("parsing given values file")?
        };

        let mut given_items: HashSet<Item> = HashSet::new();
        for descriptor in &descriptors {
            given_items.insert(Item::new(descriptor.item.as_str()));
            let children: IndexMap<Item, Vec<String>> = descriptor
                .children
                .iter()
                .map(|(key, values)| {
                    given_items.insert(Item::new(key.as_str()));
                    (Item::new(key.as_str()), values.clone())
                })
                .collect();
            let group = InputGroup::new((Item::new(descriptor.item.as_str()), descriptor.value.clone()), children);
            group.register(&mut state)?;
        }

        let target_items: Vec<Item> = targets.iter().map(|t| Item::new(t.as_str())).collect();
        let plan = BuildPlan::new().execute(state.modules(), &target_items, &given_items)?;

        let config = Config::load();
        let executor = Arc::new(ShellExecutor::new(&modules));
        let runner = RunWorkflow::new(executor);

        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
        bar.set_message("running workflow...");
        bar.enable_steady_tick(std::time::Duration::from_millis(120));

        runner
            .execute(&mut state, &plan, &target_items, workspace, &RunParams(config.as_executor_params()))
            .await?;

        bar.finish_with_message("done");
        println!("{} job(s) known, {} still pending.", state.jobs().count(), state.pending_jobs().count());
        Ok(())
    }
}

pub struct InvalidateCommand;

impl InvalidateCommand {
    pub fn execute(workspace: &Path, modules_dir: &Path, target_items: &[String]) -> Result<()> {
        let modules = JsonModuleLoader::new().load_all(modules_dir).context("loading module descriptors")?;
        let mut state = state_file::load(workspace, modules.clone()).context("loading workflow state")?;

        let given_items: HashSet<Item> = HashSet::new();
        let produced: Vec<Item> = modules.iter().flat_map(|m| m.outputs.clone()).collect();
        let plan = BuildPlan::new().execute(state.modules(), &produced, &given_items)?;

        let targets: HashSet<Item> = target_items.iter().map(|t| Item::new(t.as_str())).collect();
        let removed = InvalidateItems::new().execute(&mut state, &plan, &targets, workspace)?;
        state_file::save(&state, workspace)?;

        println!("Removed {} job(s).", removed.len());
        Ok(())
    }
}
