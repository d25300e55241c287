use thiserror::Error;

use crate::ids::{GateIden, UserIden};

/// Error wrapper for errors raised by a caller-supplied [`crate::hive::HiveNode`]
/// or [`crate::nexus::NexusBus`] implementation.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// No user with the given identifier or name.
    #[error("no such user: {0}")]
    NoSuchUser(String),

    /// No role with the given identifier or name.
    #[error("no such role: {0}")]
    NoSuchRole(String),

    /// No authgate with the given identifier.
    #[error("no such authgate: {0}")]
    NoSuchAuthGate(GateIden),

    /// A user with this name already exists.
    #[error("user name already in use: {0}")]
    DupUserName(String),

    /// A role with this name already exists.
    #[error("role name already in use: {0}")]
    DupRoleName(String),

    /// The `root` user may never be deleted.
    #[error("the \"root\" user may not be deleted")]
    CantDelRootUser,

    /// The `all` role may never be deleted.
    #[error("the \"all\" role may not be deleted")]
    CantDelAllRole,

    /// The `all` role may never be revoked from a user.
    #[error("the \"all\" role may not be revoked")]
    CantRevokeAllRole,

    /// A persisted AuthGate's type disagrees with the caller's declared type.
    #[error("authgate {iden} is stored with type {stored:?}, not {requested:?}")]
    InconsistentStorage {
        iden: GateIden,
        stored: String,
        requested: String,
    },

    /// Permission denied; raised only by `confirm`.
    #[error("{message}")]
    AuthDeny {
        message: String,
        perm: String,
        user: UserIden,
        gate: Option<GateIden>,
    },

    /// Malformed argument to a validator such as `setPasswd`.
    #[error("bad argument: {0}")]
    BadArg(String),

    /// A development-time invariant: a replay handler contract was not
    /// fulfilled (unknown event tag, malformed event payload). Errors
    /// raised here during a replayed event are fatal to the replay.
    #[error("no such handler implementation for tag {0:?}")]
    NoSuchImpl(String),

    /// Error surfaced by the caller-supplied persistent store.
    #[error("hive error: {0}")]
    Hive(#[source] CollaboratorError),

    /// Error surfaced by the caller-supplied replication bus.
    #[error("nexus error: {0}")]
    Nexus(#[source] CollaboratorError),
}

impl Error {
    pub(crate) fn no_such_user(target: impl std::fmt::Display) -> Self {
        Self::NoSuchUser(target.to_string())
    }

    pub(crate) fn no_such_role(target: impl std::fmt::Display) -> Self {
        Self::NoSuchRole(target.to_string())
    }

    pub(crate) fn hive(err: impl Into<CollaboratorError>) -> Self {
        Self::Hive(err.into())
    }

    pub(crate) fn nexus(err: impl Into<CollaboratorError>) -> Self {
        Self::Nexus(err.into())
    }
}
