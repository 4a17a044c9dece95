use crate::application::services::{DependencyPlan, DependencySolver};
use crate::domain::entities::{ComputeModule, Item};
use anyhow::Result;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Solves a dependency plan for a set of target items against a declared
/// module set, given what is available up front.
pub struct BuildPlan {
    solver: DependencySolver,
}

impl BuildPlan {
    pub fn new() -> Self {
        Self {
            solver: DependencySolver::new(),
        }
    }

    /// Solves for a plan and then, as a distinct pass (not folded into the
    /// solver itself), checks it is feasible against `given`.
    pub fn execute(
        &self,
        modules: &IndexMap<String, ComputeModule>,
        targets: &[Item],
        given: &HashSet<Item>,
    ) -> Result<DependencyPlan> {
        let plan = self.solver.solve(modules, targets, given)?;
        DependencySolver::check_feasible(modules, &plan, given)?;
        Ok(plan)
    }
}

impl Default for BuildPlan {
    fn default() -> Self {
        Self::new()
    }
}
