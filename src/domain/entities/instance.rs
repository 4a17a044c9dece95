//! Item instance and job instance entities.
//!
//! These are the concrete, run-scoped counterparts of [`Item`] and
//! [`ComputeModule`](super::ComputeModule): an `ItemInstance` is one value
//! flowing through an item's pipe, a `JobInstance` is one scheduled
//! execution of a module against a particular set of item instances.

use super::Item;
use crate::domain::value_objects::{ItemInstanceId, JobId, JobSignature};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A concrete value produced for (or given as) an [`Item`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: ItemInstanceId,
    pub item: Item,
    pub value: String,
    /// The job that produced this instance, or `None` if it was given as a
    /// run input.
    pub made_by: Option<JobId>,
}

impl ItemInstance {
    pub fn given(id: ItemInstanceId, item: Item, value: String) -> Self {
        Self {
            id,
            item,
            value,
            made_by: None,
        }
    }

    pub fn produced(id: ItemInstanceId, item: Item, value: String, made_by: JobId) -> Self {
        Self {
            id,
            item,
            value,
            made_by: Some(made_by),
        }
    }

    pub fn is_given(&self) -> bool {
        self.made_by.is_none()
    }
}

/// The instance(s) bound to one declared input (or output) key of a job: a
/// single instance for an ungrouped input, an ordered list of instances for
/// one that is declared grouped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Single(ItemInstanceId),
    List(Vec<ItemInstanceId>),
}

impl InputValue {
    /// Flattens to the ids it carries, in order.
    pub fn ids(&self) -> Vec<ItemInstanceId> {
        match self {
            InputValue::Single(id) => vec![id.clone()],
            InputValue::List(ids) => ids.clone(),
        }
    }
}

/// One scheduled (and possibly already completed) execution of a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: JobId,
    pub module: String,
    /// Input item key -> the instance(s) bound to it. A single instance for
    /// an ungrouped input, an ordered list for a grouped one.
    pub inputs: IndexMap<String, InputValue>,
    /// Output item key -> the instance produced for it, filled in by
    /// [`WorkflowState::complete_job`](crate::domain::workflow_state::WorkflowState::complete_job).
    pub outputs: IndexMap<String, InputValue>,
    pub signature: JobSignature,
    pub complete: bool,
}

impl JobInstance {
    pub fn new(id: JobId, module: String, inputs: IndexMap<String, InputValue>, signature: JobSignature) -> Self {
        Self {
            id,
            module,
            inputs,
            outputs: IndexMap::new(),
            signature,
            complete: false,
        }
    }

    /// Every input instance id, flattened across keys, in declaration order.
    pub fn input_ids(&self) -> Vec<ItemInstanceId> {
        self.inputs.values().flat_map(InputValue::ids).collect()
    }

    /// Every output instance id, flattened across keys, in declaration order.
    pub fn output_ids(&self) -> Vec<ItemInstanceId> {
        self.outputs.values().flat_map(InputValue::ids).collect()
    }
}
