//! Item entity module
//!
//! An `Item` is a named, typed pipe: modules declare which items they
//! consume and produce, and the planner matches concrete values flowing
//! through those pipes. Items are interned by key so two `Item` handles for
//! the same key are cheap to compare and clone.

use std::sync::Arc;

/// A declared data pipe, identified by its key.
///
/// Equality and hashing are on the key string; the `Arc<str>` makes clones
/// of a widely-shared item (e.g. a module's declared output, referenced by
/// every downstream module that consumes it) cheap.
#[derive(Debug, Clone)]
pub struct Item(Arc<str>);

impl Item {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for Item {}

impl std::hash::Hash for Item {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Item {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Interns [`Item`]s by key so repeated lookups return the same handle.
#[derive(Debug, Default)]
pub struct ItemRegistry {
    items: std::collections::HashMap<String, Item>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the interned item for `key`, creating it on first use.
    pub fn intern(&mut self, key: &str) -> Item {
        if let Some(item) = self.items.get(key) {
            return item.clone();
        }
        let item = Item::new(key);
        self.items.insert(key.to_string(), item.clone());
        item
    }

    pub fn get(&self, key: &str) -> Option<Item> {
        self.items.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_returns_equal_items_for_the_same_key() {
        let mut reg = ItemRegistry::new();
        let a = reg.intern("raw_reads");
        let b = reg.intern("raw_reads");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_keys_are_not_equal() {
        let mut reg = ItemRegistry::new();
        assert_ne!(reg.intern("a"), reg.intern("b"));
    }
}
