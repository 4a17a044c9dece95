//! Executor trait: the narrow boundary to the (out of scope) module runner.
//!
//! Everything about *how* a job's procedure actually runs lives on the
//! other side of this trait. The orchestrator only needs to prepare a run
//! once and then run individual jobs against it, and to get back a
//! structured result it can fold into [`WorkflowState`](crate::domain::workflow_state::WorkflowState).

use crate::domain::entities::{Item, JobInstance};
use crate::domain::value_objects::JobId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// What an executor reports back after running one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job: JobId,
    pub exit_code: i32,
    pub error_message: Option<String>,
    /// Output item -> produced value, for each output the job actually
    /// produced. A masked output missing here is simply not produced this
    /// run (not an error unless the module contract requires it).
    pub made_by: HashMap<String, String>,
    pub manifest: PathBuf,
    pub resource_log: Option<PathBuf>,
    pub out_log: Option<PathBuf>,
    pub err_log: Option<PathBuf>,
    pub commands: Vec<String>,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0 && self.error_message.is_none()
    }
}

/// Narrow interface to the external module runner.
///
/// Implementations own everything about workspace preparation and process
/// supervision for a single job; the orchestrator calls `run` once per
/// scheduled job instance and folds the result back into its own state.
///
/// Methods are blocking by design: the supervisor runs each job on its own
/// `tokio::task::spawn_blocking` thread (mirroring the one-worker-thread-
/// per-job model), so an implementation is free to block on process I/O
/// without an executor-level async runtime of its own.
pub trait Executor: Send + Sync {
    /// One-time preparation for the whole run: materializes the declared
    /// procedure steps into `inputs_dir`, with whatever `params` the
    /// caller configured (thread count, memory budget, wait timeouts, ...).
    fn prepare_run(
        &self,
        steps: &[Item],
        inputs_dir: &Path,
        params: &HashMap<String, String>,
    ) -> anyhow::Result<()>;

    /// Runs a single job's procedure in `workspace`. The result names
    /// whichever declared outputs the job actually produced this run; a
    /// masked output absent from `made_by` is simply not produced, not an
    /// error, unless the module's contract requires it.
    fn run(&self, job: &JobInstance, workspace: &Path, params: &HashMap<String, String>) -> anyhow::Result<JobResult>;
}
