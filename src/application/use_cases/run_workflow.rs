//! Run Workflow use case: the concurrent execution supervisor.
//!
//! One supervisor task drains a bounded completion channel fed by one
//! `spawn_blocking` worker per submitted job. After every drained batch it
//! re-runs the planner (new instances may unlock new jobs), persists state,
//! and checks for a pending `SIGINT`/`SIGTERM` before submitting the next
//! round. There is no priority queue and no speculative execution: jobs are
//! submitted in `pending_jobs` insertion order every round.

use crate::application::services::{DependencyPlan, Planner, ProvenanceGraph};
use crate::domain::entities::Item;
use crate::domain::repositories::{Executor, JobResult};
use crate::domain::value_objects::JobId;
use crate::domain::workflow_state::WorkflowState;
use crate::error::OrchestratorError;
use crate::infrastructure::persistence::state_file;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Run-scoped knobs handed down to the executor (thread count, memory
/// budget, file-system-wait timeout, ...). Opaque to the orchestrator core.
#[derive(Debug, Clone, Default)]
pub struct RunParams(pub HashMap<String, String>);

pub struct RunWorkflow<E: Executor + 'static> {
    executor: Arc<E>,
}

impl<E: Executor + 'static> RunWorkflow<E> {
    pub fn new(executor: Arc<E>) -> Self {
        Self { executor }
    }

    pub async fn execute(
        &self,
        state: &mut WorkflowState,
        plan: &DependencyPlan,
        steps: &[Item],
        workspace: &Path,
        params: &RunParams,
    ) -> Result<()> {
        let inputs_dir = workspace.join("inputs");
        std::fs::create_dir_all(&inputs_dir).with_context(|| format!("creating {}", inputs_dir.display()))?;
        link_given_inputs(state, &inputs_dir)?;
        self.executor
            .prepare_run(steps, &inputs_dir, &params.0)
            .context("executor failed to prepare run")?;

        let provenance = ProvenanceGraph::build(state.modules());
        let planner = Planner::new();
        planner.update(state, plan, &provenance)?;
        state_file::save(state, workspace)?;

        let kill_now = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel::<(JobId, Result<JobResult>)>(64);
        let mut submitted: HashSet<JobId> = HashSet::new();

        while state.has_pending_jobs() && !kill_now.load(Ordering::SeqCst) {
            let to_submit: Vec<JobId> = state
                .pending_jobs()
                .filter(|id| !submitted.contains(*id))
                .cloned()
                .collect();

            for job_id in to_submit {
                submitted.insert(job_id.clone());
                let job = state.job(&job_id).expect("just listed as pending").clone();
                let executor = Arc::clone(&self.executor);
                let params = params.0.clone();
                let job_workspace = job_workspace_dir(workspace, &job.module, &job_id);
                let tx = tx.clone();
                tokio::task::spawn_blocking(move || {
                    let outcome = std::fs::create_dir_all(&job_workspace)
                        .map_err(anyhow::Error::from)
                        .and_then(|_| executor.run(&job, &job_workspace, &params));
                    let _ = tx.blocking_send((job_id, outcome));
                });
            }

            let Some((job_id, outcome)) = self.wait_for_next(&mut rx, Arc::clone(&kill_now)).await else {
                break;
            };
            self.apply_result(state, &job_id, outcome, steps, workspace)?;

            // Drain whatever else already arrived without blocking, so one
            // `Update` covers the whole batch rather than one job at a time.
            while let Ok((job_id, outcome)) = rx.try_recv() {
                self.apply_result(state, &job_id, outcome, steps, workspace)?;
            }

            let provenance = ProvenanceGraph::build(state.modules());
            planner.update(state, plan, &provenance)?;
            state_file::save(state, workspace)?;
        }

        if kill_now.load(Ordering::SeqCst) {
            warn!("run terminated by signal; state saved, unfinished jobs left pending");
        }
        Ok(())
    }

    async fn wait_for_next(
        &self,
        rx: &mut mpsc::Receiver<(JobId, Result<JobResult>)>,
        kill_now: Arc<AtomicBool>,
    ) -> Option<(JobId, Result<JobResult>)> {
        tokio::select! {
            result = rx.recv() => result,
            _ = Self::wait_for_termination() => {
                kill_now.store(true, Ordering::SeqCst);
                None
            }
        }
    }

    #[cfg(unix)]
    async fn wait_for_termination() {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_termination() {
        let _ = tokio::signal::ctrl_c().await;
    }

    fn apply_result(
        &self,
        state: &mut WorkflowState,
        job_id: &JobId,
        outcome: Result<JobResult>,
        targets: &[Item],
        workspace: &Path,
    ) -> Result<()> {
        match outcome {
            Ok(result) if result.is_success() => {
                let module_name = state
                    .job(job_id)
                    .map(|j| j.module.clone())
                    .unwrap_or_default();
                let module = state.module(&module_name).cloned();
                let outputs = match module {
                    Some(module) => result
                        .made_by
                        .into_iter()
                        .filter_map(|(key, value)| module.outputs.iter().find(|o| o.key() == key).map(|item| (item.clone(), value)))
                        .collect(),
                    None => Vec::new(),
                };
                state.complete_job(job_id, outputs)?;
                link_target_outputs(state, job_id, targets, workspace)?;
                debug!(job = %job_id, "job completed");
            }
            Ok(result) => {
                warn!(job = %job_id, exit_code = result.exit_code, error = ?result.error_message, "job failed, recording as complete with no outputs");
                state.complete_job_failed(job_id)?;
            }
            Err(err) => {
                warn!(job = %job_id, error = %err, "executor errored, recording as complete with no outputs");
                state.complete_job_failed(job_id)?;
            }
        }
        Ok(())
    }
}

/// Per-job output folder, a sibling of `inputs/`, `outputs/`, and
/// `previous_run_NNN/` at the workspace root -- never nested under any of
/// them.
fn job_workspace_dir(workspace: &Path, module: &str, job_id: &JobId) -> PathBuf {
    workspace.join(format!("{module}--{job_id}"))
}

/// Symlinks every given item's file into `inputs/`, numbered in the order
/// the ids sort in (`NNNN--<basename>`), so an external procedure can find
/// its given inputs without knowing the workspace layout. Fatal if a given
/// value names a path that does not exist.
fn link_given_inputs(state: &WorkflowState, inputs_dir: &Path) -> Result<()> {
    let mut given: Vec<_> = state.given_ids().cloned().collect();
    given.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));

    for (i, id) in given.iter().enumerate() {
        let instance = state.item_instance(id).expect("id came from state.given_ids()");
        let source = Path::new(&instance.value);
        if !source.exists() {
            return Err(OrchestratorError::GivenPathMissing {
                item: instance.item.key().to_string(),
                path: source.to_path_buf(),
            }
            .into());
        }
        let basename = source.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| instance.value.clone());
        let link_path = inputs_dir.join(format!("{i:04}--{basename}"));
        relink(source, &link_path)?;
    }
    Ok(())
}

/// Symlinks the instances `job_id` produced for any of `targets` into
/// `outputs/`, prefixed `<module>--<jobID>.<filename>`.
fn link_target_outputs(state: &WorkflowState, job_id: &JobId, targets: &[Item], workspace: &Path) -> Result<()> {
    let job = state.job(job_id).expect("just completed by the caller");
    if job.outputs.is_empty() {
        return Ok(());
    }
    let outputs_dir = workspace.join("outputs");
    std::fs::create_dir_all(&outputs_dir).with_context(|| format!("creating {}", outputs_dir.display()))?;
    let job_dir = job_workspace_dir(workspace, &job.module, job_id);

    for value in job.outputs.values() {
        for id in value.ids() {
            let instance = state.item_instance(&id).expect("just produced by complete_job");
            if !targets.contains(&instance.item) {
                continue;
            }
            let basename = Path::new(&instance.value)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| instance.value.clone());
            let link_path = outputs_dir.join(format!("{}--{}.{}", job.module, job_id, basename));
            let target_path = job_dir.join(&instance.value);
            relink(&target_path, &link_path)?;
        }
    }
    Ok(())
}

/// Creates `link` as a symlink pointing at `target`, replacing any stale
/// link left over from a previous (interrupted, re-run) attempt.
fn relink(target: &Path, link: &Path) -> Result<()> {
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(link).with_context(|| format!("removing stale symlink {}", link.display()))?;
    }
    symlink(target, link).with_context(|| format!("symlinking {} -> {}", link.display(), target.display()))?;
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_workspace_dir_is_a_sibling_of_outputs_not_nested_in_it() {
        let dir = job_workspace_dir(Path::new("/tmp/ws"), "align", &JobId("abc123".into()));
        assert_eq!(dir, PathBuf::from("/tmp/ws/align--abc123"));
    }
}
