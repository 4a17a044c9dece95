//! Typed error surface for the orchestrator library.
//!
//! CLI and use-case code wraps these in `anyhow::Context` as it crosses into
//! the presentation layer; callers that want to match on a specific failure
//! (tests, embedding code) match on the variants directly.

use crate::domain::value_objects::{ItemInstanceId, JobId};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("duplicate module declared: {0}")]
    DuplicateModule(String),

    #[error("no feasible plan reaches target(s) {targets:?}: {reason}")]
    NoPlan { targets: Vec<String>, reason: String },

    #[error("module `{module}` groups input `{input}` by `{group_by}`, which is not upstream of it")]
    InvalidGrouping {
        module: String,
        input: String,
        group_by: String,
    },

    #[error("target item `{0}` is neither given nor produced by any module")]
    MissingTarget(String),

    #[error("could not generate a unique id after {attempts} attempts")]
    IdExhausted { attempts: u32 },

    #[error("workflow state file is corrupt: reconstruction made no progress with {remaining} unresolved entries")]
    CorruptState { remaining: usize },

    #[error("module `{module}` shape on disk does not match the state file (expected {expected:?}, found {found:?})")]
    ModuleShapeMismatch {
        module: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("item instance `{0}` not found")]
    UnknownItemInstance(ItemInstanceId),

    #[error("job `{0}` not found")]
    UnknownJob(JobId),

    #[error("item `{item}` already has a producer for this run ({existing})")]
    DuplicateProducer { item: String, existing: JobId },

    #[error("item instance id `{0}` collides with an existing instance")]
    DuplicateItemInstanceId(ItemInstanceId),

    #[error("job id `{0}` collides with an existing job")]
    DuplicateJobId(JobId),

    #[error("executor reported failure for job {job}: {message}")]
    JobFailed { job: JobId, message: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("given item `{item}` has no file at `{path}`")]
    GivenPathMissing { item: String, path: PathBuf },

    #[error("failed to (de)serialize workflow state: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
