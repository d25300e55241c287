use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::nexus::NexusValue;

/// The persistent hierarchical store contract (§6). A `HiveNode` is a
/// tree node with a name, a scalar value, and a child map.
///
/// This crate never assumes a concrete backing store: callers supply an
/// implementation (a real on-disk tree, a database-backed tree, ...) and
/// [`crate::memory_hive::MemoryHive`] is a reference implementation kept
/// in memory, for tests and for standalone embedding.
#[async_trait(?Send)]
pub trait HiveNode: Clone + Sized + 'static {
    /// The terminal path segment.
    fn name(&self) -> &str;

    /// The node's scalar value, if any has been set.
    fn value(&self) -> Option<String>;

    /// Durable, replicated assignment. Suspends.
    async fn set_value(&self, value: String) -> Result<()>;

    /// Durable removal of this node and its subtree. Suspends.
    async fn pop(&self) -> Result<()>;

    /// Lazily creates (if absent) and returns the named child.
    async fn open_child(&self, name: &str) -> Result<Self>;

    /// Iterates over this node's children as `(name, node)` pairs.
    async fn children(&self) -> Result<Vec<(String, Self)>>;

    /// Returns a subtree-backed mapping view of this node.
    async fn dict(&self) -> Result<HiveDict>;
}

/// A subtree-backed key/value mapping, as returned by [`HiveNode::dict`].
///
/// Backed by a caller-supplied [`HiveDictBackend`] so `User`/`Role` and
/// their profile/vars sub-dictionaries don't need to be generic over the
/// concrete `HiveNode` implementation.
pub struct HiveDict {
    backend: Box<dyn HiveDictBackend>,
}

impl HiveDict {
    pub fn new(backend: Box<dyn HiveDictBackend>) -> Self {
        Self { backend }
    }

    pub async fn get(&self, key: &str) -> Option<NexusValue> {
        self.backend.get(key).await
    }

    pub async fn set(&self, key: &str, value: NexusValue) -> Result<()> {
        self.backend.set(key, value).await
    }

    /// Serializes the whole mapping to a plain map, per §6.
    pub async fn pack(&self) -> HashMap<String, NexusValue> {
        self.backend.pack().await
    }
}

/// The storage backend for a single [`HiveDict`]. Implementations persist
/// into whatever subtree the owning `HiveNode::dict()` call was rooted at.
#[async_trait(?Send)]
pub trait HiveDictBackend {
    async fn get(&self, key: &str) -> Option<NexusValue>;
    async fn set(&self, key: &str, value: NexusValue) -> Result<()>;
    async fn pack(&self) -> HashMap<String, NexusValue>;
}
