use std::collections::{HashMap, HashSet};

use crate::gate::AuthGate;
use crate::ids::{GateIden, RoleIden, UserIden};
use crate::role::Role;
use crate::user::User;

/// The non-generic in-memory indices `Auth` maintains over its users,
/// roles, and gates.
///
/// Kept separate from `Auth<H, N>` itself so that `User`/`Role` can hold a
/// plain `Weak<RefCell<Registry>>` back-reference (needed to resolve role
/// membership during evaluation, §4.2) without becoming generic over the
/// caller's `HiveNode`/`NexusBus` implementations.
#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) users_by_iden: HashMap<UserIden, User>,
    pub(crate) users_by_name: HashMap<String, UserIden>,
    pub(crate) roles_by_iden: HashMap<RoleIden, Role>,
    pub(crate) roles_by_name: HashMap<String, RoleIden>,
    pub(crate) gates: HashMap<GateIden, AuthGate>,
    /// Reverse index: role iden -> the users currently holding it. Lets
    /// role-driven cache invalidation avoid scanning every user (§4.3).
    pub(crate) role_members: HashMap<RoleIden, HashSet<UserIden>>,
    pub(crate) all_role: Option<RoleIden>,
    pub(crate) root_user: Option<UserIden>,
}

impl Registry {
    pub(crate) fn role(&self, iden: &RoleIden) -> Option<Role> {
        self.roles_by_iden.get(iden).cloned()
    }

    pub(crate) fn role_by_name(&self, name: &str) -> Option<Role> {
        self.roles_by_name
            .get(name)
            .and_then(|iden| self.roles_by_iden.get(iden))
            .cloned()
    }

    pub(crate) fn user(&self, iden: &UserIden) -> Option<User> {
        self.users_by_iden.get(iden).cloned()
    }

    pub(crate) fn user_by_name(&self, name: &str) -> Option<User> {
        self.users_by_name
            .get(name)
            .and_then(|iden| self.users_by_iden.get(iden))
            .cloned()
    }

    pub(crate) fn gate(&self, iden: &GateIden) -> Option<AuthGate> {
        self.gates.get(iden).cloned()
    }

    pub(crate) fn note_membership(&mut self, role: RoleIden, user: UserIden) {
        self.role_members.entry(role).or_default().insert(user);
    }

    pub(crate) fn forget_membership(&mut self, role: &RoleIden, user: &UserIden) {
        if let Some(members) = self.role_members.get_mut(role) {
            members.remove(user);
        }
    }

    /// Every user currently holding `role`, for cache invalidation and for
    /// the `delRole` revoke-from-all-users cascade (§4.1).
    pub(crate) fn members_of(&self, role: &RoleIden) -> Vec<User> {
        self.role_members
            .get(role)
            .into_iter()
            .flatten()
            .filter_map(|iden| self.users_by_iden.get(iden).cloned())
            .collect()
    }
}
