//! Compute module entity module
//!
//! A `ComputeModule` is a declared unit of work: it names the items it
//! consumes (optionally grouped by an upstream item) and the items it
//! produces, plus a handle to the external procedure that an [`Executor`]
//! runs to actually produce them.

use super::Item;
use serde::{Deserialize, Serialize};

/// One declared input of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInput {
    pub item: Item,
    /// If set, this input is grouped by the named upstream item: the module
    /// receives every instance of `item` that shares a common ancestor
    /// instance of `group_by` with the job's other inputs, rather than a
    /// single instance from a cross-product.
    pub group_by: Option<Item>,
}

// `Item` serializes as its bare key string, used by `ModuleInput` and
// `ComputeModule` below.
mod item_serde {
    use super::super::Item;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for Item {
        fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            self.key().serialize(s)
        }
    }

    impl<'de> Deserialize<'de> for Item {
        fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            let s = String::deserialize(d)?;
            Ok(Item::new(s))
        }
    }
}

/// Opaque reference to the external procedure a module runs.
///
/// Out of core scope: the orchestrator never interprets this value, it only
/// hands it to the configured [`Executor`](crate::domain::repositories::Executor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureHandle(pub String);

/// A declared compute module: a named transform from input items to output
/// items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeModule {
    pub name: String,
    pub inputs: Vec<ModuleInput>,
    pub outputs: Vec<Item>,
    /// Outputs in this set are "final": at most one job instance of this
    /// module may produce a given masked output item within a run.
    pub output_mask: std::collections::HashSet<Item>,
    pub procedure: ProcedureHandle,
}

impl ComputeModule {
    pub fn ungrouped_inputs(&self) -> impl Iterator<Item = &ModuleInput> {
        self.inputs.iter().filter(|i| i.group_by.is_none())
    }

    pub fn grouped_inputs(&self) -> impl Iterator<Item = &ModuleInput> {
        self.inputs.iter().filter(|i| i.group_by.is_some())
    }

    pub fn produces(&self, item: &Item) -> bool {
        self.outputs.contains(item)
    }

    pub fn consumes(&self, item: &Item) -> bool {
        self.inputs.iter().any(|i| &i.item == item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, inputs: Vec<ModuleInput>, outputs: Vec<&str>) -> ComputeModule {
        ComputeModule {
            name: name.to_string(),
            inputs,
            outputs: outputs.into_iter().map(Item::new).collect(),
            output_mask: Default::default(),
            procedure: ProcedureHandle(format!("{name}.sh")),
        }
    }

    #[test]
    fn ungrouped_and_grouped_inputs_partition_correctly() {
        let m = module(
            "align",
            vec![
                ModuleInput {
                    item: Item::new("reads"),
                    group_by: None,
                },
                ModuleInput {
                    item: Item::new("contig"),
                    group_by: Some(Item::new("sample")),
                },
            ],
            vec!["alignment"],
        );
        assert_eq!(m.ungrouped_inputs().count(), 1);
        assert_eq!(m.grouped_inputs().count(), 1);
        assert!(m.produces(&Item::new("alignment")));
        assert!(m.consumes(&Item::new("reads")));
    }
}
