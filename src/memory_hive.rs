//! An in-memory reference implementation of [`HiveNode`], for tests and
//! for embedding this crate without a real persistent store on hand.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;

use crate::error::Result;
use crate::hive::{HiveDict, HiveDictBackend, HiveNode};
use crate::nexus::NexusValue;

struct Inner {
    value: Option<String>,
    children: HashMap<String, MemoryHive>,
    dict: Rc<RefCell<HashMap<String, NexusValue>>>,
}

/// A tree node held entirely in memory. Mutations are durable only for
/// the lifetime of the process; nothing is written to disk.
///
/// The path segment is kept outside the `RefCell` since it's immutable
/// for the node's lifetime and `HiveNode::name` must return a plain
/// borrow.
#[derive(Clone)]
pub struct MemoryHive {
    name: Rc<str>,
    inner: Rc<RefCell<Inner>>,
}

impl MemoryHive {
    /// Creates a fresh, unnamed root node.
    pub fn root() -> Self {
        Self::named(String::new())
    }

    fn named(name: String) -> Self {
        Self {
            name: Rc::from(name.as_str()),
            inner: Rc::new(RefCell::new(Inner {
                value: None,
                children: HashMap::new(),
                dict: Rc::new(RefCell::new(HashMap::new())),
            })),
        }
    }
}

impl Default for MemoryHive {
    fn default() -> Self {
        Self::root()
    }
}

#[async_trait(?Send)]
impl HiveNode for MemoryHive {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Option<String> {
        self.inner.borrow().value.clone()
    }

    async fn set_value(&self, value: String) -> Result<()> {
        self.inner.borrow_mut().value = Some(value);
        Ok(())
    }

    async fn pop(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.value = None;
        inner.children.clear();
        inner.dict.borrow_mut().clear();
        Ok(())
    }

    async fn open_child(&self, name: &str) -> Result<Self> {
        let mut inner = self.inner.borrow_mut();
        if let Some(existing) = inner.children.get(name) {
            return Ok(existing.clone());
        }
        let child = MemoryHive::named(name.to_string());
        inner.children.insert(name.to_string(), child.clone());
        Ok(child)
    }

    async fn children(&self) -> Result<Vec<(String, Self)>> {
        let inner = self.inner.borrow();
        Ok(inner
            .children
            .iter()
            .map(|(name, node)| (name.clone(), node.clone()))
            .collect())
    }

    async fn dict(&self) -> Result<HiveDict> {
        let store = self.inner.borrow().dict.clone();
        Ok(HiveDict::new(Box::new(MemoryDict { store })))
    }
}

struct MemoryDict {
    store: Rc<RefCell<HashMap<String, NexusValue>>>,
}

#[async_trait(?Send)]
impl HiveDictBackend for MemoryDict {
    async fn get(&self, key: &str) -> Option<NexusValue> {
        self.store.borrow().get(key).cloned()
    }

    async fn set(&self, key: &str, value: NexusValue) -> Result<()> {
        self.store.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    async fn pack(&self) -> HashMap<String, NexusValue> {
        self.store.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn open_child_is_idempotent() {
        let root = MemoryHive::root();
        let a1 = block_on(root.open_child("users")).unwrap();
        let a2 = block_on(root.open_child("users")).unwrap();
        block_on(a1.set_value("x".into())).unwrap();
        assert_eq!(a2.value(), Some("x".to_string()));
    }

    #[test]
    fn dict_roundtrips_values() {
        let root = MemoryHive::root();
        let dict = block_on(root.dict()).unwrap();
        block_on(dict.set("admin", NexusValue::Bool(true))).unwrap();
        let packed = block_on(dict.pack());
        assert_eq!(packed.get("admin"), Some(&NexusValue::Bool(true)));
    }

    #[test]
    fn pop_clears_value_and_children() {
        let root = MemoryHive::root();
        let child = block_on(root.open_child("users")).unwrap();
        block_on(child.set_value("alice".into())).unwrap();
        block_on(child.pop()).unwrap();
        assert_eq!(child.value(), None);
    }
}
