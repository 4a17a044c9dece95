//! Invalidation use case
//!
//! Removes a set of target items (and everything downstream of the modules
//! that produce them) from a workflow's state, moving the affected output
//! folders and the previous state file aside into a numbered
//! `previous_run_NNN/` directory rather than deleting them outright.

use crate::application::services::DependencyPlan;
use crate::domain::entities::Item;
use crate::domain::value_objects::JobId;
use crate::domain::workflow_state::WorkflowState;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

pub struct InvalidateItems;

impl InvalidateItems {
    pub fn new() -> Self {
        Self
    }

    /// `target_items` names the items to invalidate, the user-facing handle
    /// per the public data model (not module names, which callers have no
    /// general way to already know). Step 1 computes the set of modules
    /// whose outputs intersect `target_items`; every module downstream of
    /// them (per the inverse of `plan.dep_map`) is invalidated too.
    pub fn execute(
        &self,
        state: &mut WorkflowState,
        plan: &DependencyPlan,
        target_items: &HashSet<Item>,
        workspace: &Path,
    ) -> Result<Vec<JobId>> {
        let target_modules: HashSet<String> = state
            .modules()
            .values()
            .filter(|m| target_items.iter().any(|item| m.produces(item)))
            .map(|m| m.name.clone())
            .collect();

        let downstream_map = Self::invert(&plan.dep_map);
        let affected = state.affected_modules(&target_modules, &downstream_map);

        let mut all_affected = target_modules;
        all_affected.extend(affected);

        if all_affected.is_empty() {
            return Ok(Vec::new());
        }

        let previous_run_dir = Self::next_previous_run_dir(workspace, state.run_count)?;
        std::fs::create_dir_all(&previous_run_dir)
            .with_context(|| format!("creating {}", previous_run_dir.display()))?;

        Self::move_aside_matching(workspace, &previous_run_dir, &all_affected)?;
        Self::move_aside_matching(&workspace.join("outputs"), &previous_run_dir.join("outputs"), &all_affected)?;

        let state_file = workspace.join("workflow_state.json");
        if state_file.exists() {
            std::fs::rename(&state_file, previous_run_dir.join("workflow_state.json"))
                .with_context(|| "moving workflow_state.json aside".to_string())?;
        }

        let removed = state.invalidate_modules(&all_affected);
        state.run_count += 1;
        info!(
            modules = ?all_affected,
            jobs_removed = removed.len(),
            "invalidated modules"
        );
        Ok(removed)
    }

    /// Moves every entry of `dir` whose name starts with `<module>--` for one
    /// of `modules` into the matching spot under `dest`. Covers both a
    /// module's per-job workspace folders (siblings of `outputs/` at the
    /// workspace root) and its symlinked files under `outputs/` itself.
    fn move_aside_matching(dir: &Path, dest: &Path, modules: &HashSet<String>) -> Result<()> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", dir.display())),
        };
        for entry in entries {
            let entry = entry.with_context(|| format!("reading entry in {}", dir.display()))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let matches = modules.iter().any(|m| name.starts_with(&format!("{m}--")));
            if !matches {
                continue;
            }
            if !dest.exists() {
                std::fs::create_dir_all(dest).with_context(|| format!("creating {}", dest.display()))?;
            }
            let to = dest.join(&*name);
            std::fs::rename(entry.path(), &to).with_context(|| format!("moving {} aside", entry.path().display()))?;
        }
        Ok(())
    }

    fn invert(dep_map: &HashMap<String, HashSet<String>>) -> HashMap<String, Vec<String>> {
        let mut inverted: HashMap<String, Vec<String>> = HashMap::new();
        for (module, upstream) in dep_map {
            for up in upstream {
                inverted.entry(up.clone()).or_default().push(module.clone());
            }
        }
        inverted
    }

    /// `run_count` is the number of invalidations already performed; the
    /// directory created by this one is one past that.
    fn next_previous_run_dir(workspace: &Path, run_count: u32) -> Result<std::path::PathBuf> {
        Ok(workspace.join(format!("previous_run_{:03}", run_count + 1)))
    }
}

impl Default for InvalidateItems {
    fn default() -> Self {
        Self::new()
    }
}
