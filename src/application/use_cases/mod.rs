pub mod build_plan;
pub mod invalidate;
pub mod run_workflow;

pub use build_plan::BuildPlan;
pub use invalidate::InvalidateItems;
pub use run_workflow::{RunParams, RunWorkflow};
