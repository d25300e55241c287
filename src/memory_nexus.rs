//! An in-memory reference implementation of [`NexusBus`] that applies a
//! published event's handler in-process, synchronously, in publish order.
//! It models exactly one replica; a real multi-replica bus fans the same
//! call out to every follower.

use std::cell::RefCell;
use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::nexus::{NexusArgs, NexusBus, NexusHandlerFn, NexusOutcome};

#[derive(Default)]
pub struct MemoryNexus {
    handlers: RefCell<HashMap<&'static str, NexusHandlerFn>>,
}

impl MemoryNexus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait(?Send)]
impl NexusBus for MemoryNexus {
    async fn push(&self, tag: &'static str, args: NexusArgs) -> Result<NexusOutcome> {
        let handler = self
            .handlers
            .borrow()
            .get(tag)
            .cloned()
            .ok_or_else(|| Error::NoSuchImpl(tag.to_string()))?;
        handler(args).await
    }

    fn register(&self, tag: &'static str, handler: NexusHandlerFn) {
        self.handlers.borrow_mut().insert(tag, handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::rc::Rc;

    #[test]
    fn push_invokes_registered_handler() {
        let nexus = MemoryNexus::new();
        nexus.register(
            "echo",
            Rc::new(|_args| Box::pin(async move { Ok(NexusOutcome::Unit) })),
        );
        let result = block_on(nexus.push("echo", vec!["x".into()]));
        assert!(result.is_ok());
    }

    #[test]
    fn push_on_unregistered_tag_errors() {
        let nexus = MemoryNexus::new();
        let result = block_on(nexus.push("missing", vec![]));
        assert!(matches!(result, Err(Error::NoSuchImpl(_))));
    }
}
