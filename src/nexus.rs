use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use async_trait::async_trait;

use crate::error::Result;
use crate::role::Role;
use crate::user::User;

/// A serializable scalar or nested list, per the event payload contract:
/// "All arguments must be serializable scalars: strings, booleans, and
/// arrays/tuples thereof."
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NexusValue {
    Str(String),
    Bool(bool),
    List(Vec<NexusValue>),
    None,
}

impl NexusValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[NexusValue]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }
}

impl From<&str> for NexusValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for NexusValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for NexusValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<NexusValue>> From<Option<T>> for NexusValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Self::None,
        }
    }
}

/// The ordered argument list for one published event.
pub type NexusArgs = Vec<NexusValue>;

/// The in-process result of applying a handler to a published event.
/// Unlike the wire payload (`NexusArgs`), this is not required to be a
/// plain scalar: the publishing replica uses it directly (mirrors the
/// "Pusher" pattern where the local call returns the handler's return
/// value), while the restriction to scalars only binds what crosses the
/// bus to other replicas.
#[derive(Clone)]
pub enum NexusOutcome {
    User(User),
    Role(Role),
    Unit,
}

impl NexusOutcome {
    pub(crate) fn into_user(self) -> User {
        match self {
            Self::User(u) => u,
            _ => panic!("nexus handler contract violated: expected User outcome"),
        }
    }

    pub(crate) fn into_role(self) -> Role {
        match self {
            Self::Role(r) => r,
            _ => panic!("nexus handler contract violated: expected Role outcome"),
        }
    }
}

/// A boxed future that need not be `Send`, matching the single-threaded
/// cooperative scheduling model (§5) this crate is built for.
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// A registered event handler.
pub type NexusHandlerFn = Rc<dyn Fn(NexusArgs) -> LocalBoxFuture<'static, Result<NexusOutcome>>>;

/// The replication bus contract (§6): publishes a named, deterministic
/// mutation and applies it via the handler bound to that tag. Handlers
/// are invoked exactly once per published event, in publication order.
///
/// This crate treats the bus as an external collaborator; callers in a
/// real multi-replica deployment supply an implementation that fans the
/// same event out to every follower. [`crate::memory_nexus::MemoryNexus`]
/// is a single-replica reference implementation for tests and standalone
/// embedding.
#[async_trait(?Send)]
pub trait NexusBus {
    /// Publishes a mutation and returns the bound handler's result.
    async fn push(&self, tag: &'static str, args: NexusArgs) -> Result<NexusOutcome>;

    /// Binds a handler to a tag. Auth registers one handler per mutation
    /// listed in §4.1 at construction time.
    fn register(&self, tag: &'static str, handler: NexusHandlerFn);
}

pub(crate) fn args_str(args: &[NexusValue], index: usize) -> Result<String> {
    args.get(index)
        .and_then(NexusValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| crate::error::Error::NoSuchImpl(format!("expected string at arg {index}")))
}

pub(crate) fn args_bool(args: &[NexusValue], index: usize) -> Result<bool> {
    args.get(index)
        .and_then(NexusValue::as_bool)
        .ok_or_else(|| crate::error::Error::NoSuchImpl(format!("expected bool at arg {index}")))
}

pub(crate) fn args_value(args: &[NexusValue], index: usize) -> Result<NexusValue> {
    args.get(index)
        .cloned()
        .ok_or_else(|| crate::error::Error::NoSuchImpl(format!("missing arg {index}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nexus_value_scalar_conversions() {
        let v: NexusValue = "hello".into();
        assert_eq!(v.as_str(), Some("hello"));
        let v: NexusValue = true.into();
        assert_eq!(v.as_bool(), Some(true));
        let v: NexusValue = Option::<String>::None.into();
        assert!(matches!(v, NexusValue::None));
    }

    #[test]
    fn args_helpers_extract_typed_values() {
        let args: NexusArgs = vec!["iden1".into(), "alice".into()];
        assert_eq!(args_str(&args, 0).unwrap(), "iden1");
        assert_eq!(args_str(&args, 1).unwrap(), "alice");
        assert!(args_str(&args, 2).is_err());
    }
}
