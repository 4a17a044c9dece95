//! `InputGroup`: a root given value plus the sibling given values that
//! belong under it.
//!
//! A run's given inputs are not just a flat item -> value map: a
//! `group_by` root can itself be given (never produced by any module), with
//! its grouped children given directly alongside it rather than produced by
//! an upstream job. `InputGroup::register` links every child's provenance
//! to its root at registration time, the same way a job links its outputs
//! to itself via `made_by`, so [`WorkflowState::given_children`](crate::domain::workflow_state::WorkflowState::given_children)
//! can serve as the join path for that case.

use super::Item;
use super::ItemInstance;
use crate::domain::value_objects::ItemInstanceId;
use crate::domain::workflow_state::WorkflowState;
use crate::error::Result;
use indexmap::IndexMap;

#[derive(Debug, Clone)]
pub struct InputGroup {
    pub root: (Item, String),
    pub children: IndexMap<Item, Vec<String>>,
}

impl InputGroup {
    pub fn new(root: (Item, String), children: IndexMap<Item, Vec<String>>) -> Self {
        Self { root, children }
    }

    /// Registers the root and every child value as given item instances,
    /// linking each child back to the root. Returns the root's instance id.
    pub fn register(&self, state: &mut WorkflowState) -> Result<ItemInstanceId> {
        let (root_item, root_value) = self.root.clone();
        let root_id = state.register_given(ItemInstance::given(ItemInstanceId::random(), root_item, root_value))?;

        for (item, values) in &self.children {
            for value in values {
                let child_id = ItemInstanceId::random();
                state.register_given(ItemInstance::given(child_id.clone(), item.clone(), value.clone()))?;
                state.link_given_child(&root_id, item.key().to_string(), child_id);
            }
        }
        Ok(root_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ComputeModule;

    #[test]
    fn register_links_every_child_to_its_root() {
        let mut state = WorkflowState::new(Vec::<ComputeModule>::new()).unwrap();
        let mut children = IndexMap::new();
        children.insert(Item::new("reads"), vec!["r1.fq".to_string(), "r2.fq".to_string()]);
        let group = InputGroup::new((Item::new("sample"), "s1".to_string()), children);

        let root_id = group.register(&mut state).unwrap();
        assert_eq!(state.given_children(&root_id, "reads").len(), 2);
        assert_eq!(state.item_instances().count(), 3);
    }
}
