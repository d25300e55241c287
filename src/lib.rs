//! An in-memory authorization core: users, roles, per-object gates, and a
//! replicated decision engine.
//!
//! A [`User`] carries its own rules, roles and admin/locked/archived
//! state; a [`Role`] is a named, shareable bag of rules; an [`AuthGate`]
//! is a per-object overlay letting a specific user or role be granted
//! rules scoped to one externally-owned object. [`Auth`] is the root
//! coordinator: it bootstraps the `root` user and `all` role, persists
//! every mutation through a caller-supplied [`HiveNode`] tree, and
//! replicates every mutation except gate creation/deletion through a
//! caller-supplied [`NexusBus`].
//!
//! Decision queries (`User::allowed`/`User::confirm`) are synchronous and
//! memoized; every mutation is `async` and suspends on the supplied
//! collaborators. This crate is not `Send`/`Sync`: it's built for a
//! single-threaded cooperative scheduler, not concurrent mutation.
//!
//! ```no_run
//! # async fn run() -> hiveauth::Result<()> {
//! use hiveauth::{Auth, AuthConfig, MemoryHive, MemoryNexus, Perm};
//!
//! let auth = Auth::new(MemoryHive::root(), MemoryNexus::new(), AuthConfig::default()).await?;
//! let alice = auth.add_user("alice").await?;
//! auth.set_user_rules(&alice, vec![hiveauth::Rule::new(true, ["node", "add"])]).await?;
//!
//! assert_eq!(alice.allowed(&Perm::new(["node", "add"]), None, None), Some(true));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod auth;
mod cache;
mod config;
mod error;
mod gate;
mod hive;
mod ids;
mod nexus;
mod registry;
mod role;
mod rule;
mod ruler;
mod user;

#[cfg(feature = "memory-hive")]
mod memory_hive;

#[cfg(feature = "memory-nexus")]
mod memory_nexus;

pub use crate::auth::{Auth, ALL_ROLE_NAME, ROOT_USER_NAME};
pub use crate::config::AuthConfig;
pub use crate::error::{CollaboratorError, Error, Result};
pub use crate::gate::AuthGate;
pub use crate::hive::{HiveDict, HiveDictBackend, HiveNode};
pub use crate::ids::{GateIden, RoleIden, UserIden};
pub use crate::nexus::{NexusArgs, NexusBus, NexusHandlerFn, NexusOutcome, NexusValue};
pub use crate::role::Role;
pub use crate::rule::{Perm, Rule};
pub use crate::user::User;

#[cfg(feature = "memory-hive")]
pub use crate::memory_hive::MemoryHive;

#[cfg(feature = "memory-nexus")]
pub use crate::memory_nexus::MemoryNexus;
