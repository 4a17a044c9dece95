//! Shell-based executor: concrete stand-in for the out-of-scope module
//! runner.
//!
//! Shells out to the path recorded in a module's `ProcedureHandle`, passing
//! job context through an `env.json` file the way `CondaExecutor` in the
//! system this was distilled from does, then reads back a `result.json`
//! manifest the procedure is expected to write into its workspace.

use crate::domain::entities::{ComputeModule, InputValue, Item, JobInstance};
use crate::domain::repositories::{Executor, JobResult};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Mirrors [`JobInstance::inputs`] exactly (item key -> bound instance id(s))
/// so the external procedure can tell which id belongs to which declared
/// input, instead of an unkeyed list of hex ids.
#[derive(Debug, Serialize)]
struct JobEnv<'a> {
    job_id: &'a str,
    module: &'a str,
    inputs: &'a IndexMap<String, InputValue>,
    params: &'a HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ResultManifest {
    #[serde(default)]
    made_by: HashMap<String, String>,
    #[serde(default)]
    resource_log: Option<String>,
    #[serde(default)]
    commands: Vec<String>,
}

pub struct ShellExecutor {
    procedures: HashMap<String, String>,
}

impl ShellExecutor {
    pub fn new(modules: &[ComputeModule]) -> Self {
        Self {
            procedures: modules.iter().map(|m| (m.name.clone(), m.procedure.0.clone())).collect(),
        }
    }
}

impl Executor for ShellExecutor {
    fn prepare_run(&self, steps: &[Item], inputs_dir: &Path, params: &HashMap<String, String>) -> Result<()> {
        let manifest = serde_json::json!({
            "steps": steps.iter().map(Item::key).collect::<Vec<_>>(),
            "params": params,
        });
        std::fs::write(inputs_dir.join("run_params.json"), serde_json::to_string_pretty(&manifest)?)
            .with_context(|| format!("writing run params into {}", inputs_dir.display()))?;
        Ok(())
    }

    fn run(&self, job: &JobInstance, workspace: &Path, params: &HashMap<String, String>) -> Result<JobResult> {
        let procedure = self
            .procedures
            .get(&job.module)
            .with_context(|| format!("no procedure registered for module `{}`", job.module))?;

        let env = JobEnv {
            job_id: job.id.as_ref(),
            module: &job.module,
            inputs: &job.inputs,
            params,
        };
        std::fs::write(workspace.join("env.json"), serde_json::to_string_pretty(&env)?)
            .with_context(|| "writing env.json".to_string())?;

        debug!(job = %job.id, procedure, "running job procedure");
        let output = Command::new(procedure)
            .current_dir(workspace)
            .output()
            .with_context(|| format!("spawning procedure `{procedure}`"))?;

        std::fs::write(workspace.join("out.log"), &output.stdout).ok();
        std::fs::write(workspace.join("err.log"), &output.stderr).ok();

        let manifest_path = workspace.join("result.json");
        let exit_code = output.status.code().unwrap_or(-1);

        if !manifest_path.exists() {
            warn!(job = %job.id, "executor produced no result.json; treating as exit code 1");
            return Ok(JobResult {
                job: job.id.clone(),
                exit_code: if exit_code == 0 { 1 } else { exit_code },
                error_message: Some("missing result.json".to_string()),
                made_by: HashMap::new(),
                manifest: manifest_path,
                resource_log: None,
                out_log: Some(workspace.join("out.log")),
                err_log: Some(workspace.join("err.log")),
                commands: Vec::new(),
            });
        }

        let manifest_bytes = std::fs::read(&manifest_path)?;
        let manifest: ResultManifest = serde_json::from_slice(&manifest_bytes)
            .with_context(|| format!("parsing {}", manifest_path.display()))?;

        Ok(JobResult {
            job: job.id.clone(),
            exit_code,
            error_message: if output.status.success() { None } else { Some(String::from_utf8_lossy(&output.stderr).to_string()) },
            made_by: manifest.made_by,
            manifest: manifest_path,
            resource_log: manifest.resource_log.map(|p| workspace.join(p)),
            out_log: Some(workspace.join("out.log")),
            err_log: Some(workspace.join("err.log")),
            commands: manifest.commands,
        })
    }
}
