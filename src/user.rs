use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::hive::HiveDict;
use crate::ids::{new_guid, GateIden, RoleIden, UserIden};
use crate::registry::Registry;
use crate::role::Role;
use crate::rule::{first_match, Perm, Rule};
use crate::ruler::{GateOverlay, Ruler, RulerState, SharedOverlay};
use crate::cache::DecisionCache;

/// Salted password shadow, per §4.2: `salt` is a fresh GUID and `hash` is
/// derived from `(salt, passwd)`. Not a KDF — see the open question in
/// `SPEC_FULL.md` §9 for why this crate keeps that shape rather than
/// "fixing" it with a slow hash.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub(crate) struct PasswdShadow {
    pub(crate) salt: String,
    pub(crate) hash: String,
}

impl PasswdShadow {
    pub(crate) fn hash_of(salt: &str, passwd: &str) -> String {
        blake3::hash(format!("{salt}:{passwd}").as_bytes()).to_hex().to_string()
    }

    fn new(passwd: &str) -> Self {
        let salt = new_guid();
        let hash = Self::hash_of(&salt, passwd);
        Self { salt, hash }
    }

    fn verify(&self, passwd: &str) -> bool {
        Self::hash_of(&self.salt, passwd) == self.hash
    }
}

struct UserInner {
    iden: UserIden,
    name: String,
    ruler: RulerState,
    locked: bool,
    archived: bool,
    passwd: Option<PasswdShadow>,
    roles: Vec<RoleIden>,
    profile: Rc<HiveDict>,
    vars: Rc<HiveDict>,
    registry: Weak<RefCell<Registry>>,
    cache: DecisionCache,
}

/// A principal: rules, roles, admin/locked/archived flags, a password
/// shadow, and a decision cache (§2, §4.2).
///
/// Cheaply cloneable, like [`Role`] and [`crate::gate::AuthGate`]: `User`
/// is a handle onto shared state, not a value.
#[derive(Clone)]
pub struct User {
    inner: Rc<RefCell<UserInner>>,
}

impl User {
    pub(crate) fn new(
        iden: UserIden,
        name: impl Into<String>,
        profile: HiveDict,
        vars: HiveDict,
        registry: Weak<RefCell<Registry>>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(UserInner {
                iden,
                name: name.into(),
                ruler: RulerState::new(),
                locked: false,
                archived: false,
                passwd: None,
                roles: Vec::new(),
                profile: Rc::new(profile),
                vars: Rc::new(vars),
                registry,
                cache: DecisionCache::new(cache_capacity),
            })),
        }
    }

    /// Builds a user with no backing registry or durable profile/vars
    /// store, for unit tests that only exercise rule evaluation.
    #[cfg(test)]
    pub(crate) fn new_detached(iden: UserIden, name: impl Into<String>) -> Self {
        use crate::memory_hive::MemoryHive;
        let root = MemoryHive::root();
        let profile = futures::executor::block_on(crate::hive::HiveNode::dict(&root)).unwrap();
        let vars = futures::executor::block_on(crate::hive::HiveNode::dict(&root)).unwrap();
        Self::new(iden, name, profile, vars, Weak::new(), 64)
    }

    pub fn iden(&self) -> UserIden {
        self.inner.borrow().iden.clone()
    }

    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    pub(crate) fn set_name(&self, name: impl Into<String>) {
        self.inner.borrow_mut().name = name.into();
    }

    pub fn is_locked(&self) -> bool {
        self.inner.borrow().locked
    }

    pub(crate) fn set_locked(&self, locked: bool) {
        self.inner.borrow_mut().locked = locked;
    }

    pub fn is_archived(&self) -> bool {
        self.inner.borrow().archived
    }

    pub(crate) fn set_archived(&self, archived: bool) {
        self.inner.borrow_mut().archived = archived;
    }

    pub fn is_admin(&self, gate: Option<&GateIden>) -> bool {
        self.local_admin(gate)
    }

    pub(crate) fn set_admin(&self, admin: bool) {
        self.inner.borrow_mut().ruler.admin = admin;
    }

    pub fn rules(&self, gate: Option<&GateIden>) -> Vec<Rule> {
        self.local_rules(gate)
    }

    pub(crate) fn set_rules(&self, rules: Vec<Rule>) {
        self.inner.borrow_mut().ruler.rules = rules;
    }

    pub(crate) fn add_rule(&self, rule: Rule, gate: Option<&GateIden>) {
        self.local_add_rule(rule, gate);
    }

    pub(crate) fn del_rule(&self, rule: &Rule, gate: Option<&GateIden>) -> bool {
        self.local_del_rule(rule, gate)
    }

    pub(crate) fn gate_overlay(&self, gate: &GateIden) -> Option<SharedOverlay> {
        self.inner.borrow().ruler.gate_overlay(gate)
    }

    pub(crate) fn attach_gate_overlay(&self, gate: GateIden, overlay: SharedOverlay) {
        self.inner.borrow_mut().ruler.authgates.insert(gate, overlay);
    }

    pub(crate) fn detach_gate_overlay(&self, gate: &GateIden) {
        self.inner.borrow_mut().ruler.authgates.remove(gate);
    }

    pub(crate) fn set_gate_admin(&self, gate: &GateIden, admin: bool) {
        let overlay = self.ensure_gate_overlay(gate);
        overlay.borrow_mut().admin = admin;
    }

    pub(crate) fn set_gate_rules(&self, gate: &GateIden, rules: Vec<Rule>) {
        let overlay = self.ensure_gate_overlay(gate);
        overlay.borrow_mut().rules = rules;
    }

    fn ensure_gate_overlay(&self, gate: &GateIden) -> SharedOverlay {
        let mut inner = self.inner.borrow_mut();
        inner
            .ruler
            .authgates
            .entry(gate.clone())
            .or_insert_with(|| Rc::new(RefCell::new(GateOverlay::default())))
            .clone()
    }

    /// The role identifiers this user currently holds, in grant order.
    pub fn role_idens(&self) -> Vec<RoleIden> {
        self.inner.borrow().roles.clone()
    }

    pub fn has_role(&self, iden: &RoleIden) -> bool {
        self.inner.borrow().roles.iter().any(|r| r == iden)
    }

    pub(crate) fn push_role(&self, iden: RoleIden) {
        self.inner.borrow_mut().roles.push(iden);
    }

    pub(crate) fn remove_role(&self, iden: &RoleIden) {
        self.inner.borrow_mut().roles.retain(|r| r != iden);
    }

    /// Replaces the whole role list in one step, as applied by the
    /// `user:info` "roles" field (grant/revoke both go through this).
    pub(crate) fn set_roles(&self, roles: Vec<RoleIden>) {
        self.inner.borrow_mut().roles = roles;
    }

    /// The gate identifiers this user currently has an overlay on, for
    /// cascading cleanup when the user or a gate is deleted.
    pub(crate) fn attached_gate_idens(&self) -> Vec<GateIden> {
        self.inner.borrow().ruler.authgates.keys().cloned().collect()
    }

    /// Resolves this user's role list to live [`Role`] handles, skipping
    /// (and logging) any identifier the registry no longer has a role for.
    /// Tolerant by design (§4.4, §7): a dangling role reference is a
    /// warning, never a hard failure at read time.
    pub fn roles(&self) -> Vec<Role> {
        let (registry, role_idens, user_iden) = {
            let inner = self.inner.borrow();
            (inner.registry.clone(), inner.roles.clone(), inner.iden.clone())
        };
        let Some(registry) = registry.upgrade() else {
            return Vec::new();
        };
        let registry = registry.borrow();
        role_idens
            .iter()
            .filter_map(|iden| match registry.role(iden) {
                Some(role) => Some(role),
                None => {
                    tracing::warn!(user = %user_iden, role = %iden, "dangling role reference");
                    None
                }
            })
            .collect()
    }

    /// A handle onto this user's free-form profile sub-tree (§6). Sets on
    /// the returned dict go straight through the supplied `HiveNode`'s own
    /// replication, independent of the `user:info` mutation table: profile
    /// data plays no part in any authorization decision.
    pub fn profile(&self) -> Rc<HiveDict> {
        self.inner.borrow().profile.clone()
    }

    /// A handle onto this user's free-form runtime-variables sub-tree
    /// (§6). Same replication contract as [`User::profile`].
    pub fn vars(&self) -> Rc<HiveDict> {
        self.inner.borrow().vars.clone()
    }

    /// Synchronous decision query (§5: must not suspend). Memoized per
    /// `(perm, default, gate)`; the memo is cleared on any mutation that
    /// could change the outcome.
    pub fn allowed(&self, perm: &Perm, default: Option<bool>, gate: Option<&GateIden>) -> Option<bool> {
        if let Some(cached) = self.inner.borrow_mut().cache.get(perm, default, gate) {
            return cached;
        }
        let decision = self.evaluate(perm, default, gate);
        self.inner.borrow_mut().cache.set(perm, default, gate, decision);
        decision
    }

    /// Like [`User::allowed`], but raises [`Error::AuthDeny`] on `false`
    /// instead of returning it (§4.2).
    pub fn confirm(&self, perm: &Perm, default: Option<bool>, gate: Option<&GateIden>) -> Result<()> {
        match self.allowed(perm, default, gate) {
            Some(true) => Ok(()),
            _ => {
                let message = match gate {
                    Some(gate) => format!(
                        "user '{}' ({}) must have permission {} on object {}",
                        self.name(),
                        self.iden(),
                        perm,
                        gate
                    ),
                    None => format!(
                        "user '{}' ({}) must have permission {}",
                        self.name(),
                        self.iden(),
                        perm
                    ),
                };
                Err(Error::AuthDeny {
                    message,
                    perm: perm.to_string(),
                    user: self.iden(),
                    gate: gate.cloned(),
                })
            }
        }
    }

    /// The seven-step evaluator (§4.2), transcribed in order: lock beats
    /// admin, gate-scoped beats global, direct beats role-derived.
    fn evaluate(&self, perm: &Perm, default: Option<bool>, gate: Option<&GateIden>) -> Option<bool> {
        if self.is_locked() {
            return Some(false);
        }
        if self.local_admin(None) {
            return Some(true);
        }
        if let Some(gate_iden) = gate {
            if let Some(overlay) = self.gate_overlay(gate_iden) {
                let overlay = overlay.borrow();
                if overlay.admin {
                    return Some(true);
                }
                if let Some(allow) = first_match(&overlay.rules, perm) {
                    return Some(allow);
                }
            }
        }
        if let Some(allow) = self.local_first_match(perm, None) {
            return Some(allow);
        }

        let roles = self.roles();

        if let Some(gate_iden) = gate {
            for role in &roles {
                if let Some(overlay) = role.gate_overlay(gate_iden) {
                    if let Some(allow) = first_match(&overlay.borrow().rules, perm) {
                        return Some(allow);
                    }
                }
            }
        }

        for role in &roles {
            if let Some(allow) = role.local_first_match(perm, None) {
                return Some(allow);
            }
        }

        default
    }

    pub(crate) fn clear_cache(&self) {
        self.inner.borrow_mut().cache.clear();
    }

    /// Verifies a plaintext password. Always `false` for a locked or
    /// passwordless user; never suspends (no hive/nexus round trip).
    pub fn try_passwd(&self, passwd: &str) -> bool {
        let inner = self.inner.borrow();
        if inner.locked {
            return false;
        }
        match &inner.passwd {
            Some(shadow) => shadow.verify(passwd),
            None => false,
        }
    }

    /// Sets this user's password shadow in place. Callers that need the
    /// mutation replicated (it is not itself one of the six `user:info`
    /// fields, but embedders typically fold it into one) are responsible
    /// for publishing that event themselves.
    pub(crate) fn set_passwd(&self, passwd: &str) -> Result<()> {
        if passwd.is_empty() {
            return Err(Error::BadArg("passwd must be a non-empty string".into()));
        }
        self.inner.borrow_mut().passwd = Some(PasswdShadow::new(passwd));
        Ok(())
    }

    /// Applies an already-computed `(salt, hash)` pair, as replayed from a
    /// `user:info` "passwd" event. Skips validation and salt generation,
    /// both already performed by the publishing replica.
    pub(crate) fn apply_passwd_shadow(&self, salt: String, hash: String) {
        self.inner.borrow_mut().passwd = Some(PasswdShadow { salt, hash });
    }

    /// The persisted `(salt, hash)` pair, if a password has been set.
    pub(crate) fn passwd_shadow(&self) -> Option<(String, String)> {
        self.inner
            .borrow()
            .passwd
            .as_ref()
            .map(|shadow| (shadow.salt.clone(), shadow.hash.clone()))
    }
}

impl Ruler for User {
    fn with_ruler_state<R>(&self, f: impl FnOnce(&RulerState) -> R) -> R {
        f(&self.inner.borrow().ruler)
    }

    fn with_ruler_state_mut<R>(&self, f: impl FnOnce(&mut RulerState) -> R) -> R {
        f(&mut self.inner.borrow_mut().ruler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(segments: &[&str]) -> Perm {
        Perm::new(segments.iter().map(|s| s.to_string()))
    }

    #[test]
    fn locked_user_is_always_denied_even_if_admin() {
        let user = User::new_detached(UserIden::generate(), "alice");
        user.set_admin(true);
        user.set_locked(true);
        assert_eq!(user.allowed(&perm(&["node", "add"]), None, None), Some(false));
    }

    #[test]
    fn admin_user_is_always_allowed() {
        let user = User::new_detached(UserIden::generate(), "alice");
        user.set_admin(true);
        assert_eq!(user.allowed(&perm(&["node", "add"]), None, None), Some(true));
    }

    #[test]
    fn user_rule_beats_default() {
        let user = User::new_detached(UserIden::generate(), "alice");
        user.set_rules(vec![Rule::new(true, ["node"])]);
        assert_eq!(user.allowed(&perm(&["node", "add"]), Some(false), None), Some(true));
    }

    #[test]
    fn falls_through_to_default_with_no_matching_rule() {
        let user = User::new_detached(UserIden::generate(), "alice");
        assert_eq!(user.allowed(&perm(&["node", "add"]), Some(false), None), Some(false));
        assert_eq!(user.allowed(&perm(&["node", "add"]), None, None), None);
    }

    #[test]
    fn gate_scoped_rule_beats_global_rule() {
        let user = User::new_detached(UserIden::generate(), "alice");
        let gate = GateIden::from_string("g1");
        user.set_rules(vec![Rule::new(true, ["node"])]);
        user.set_gate_rules(&gate, vec![Rule::new(false, ["node"])]);

        assert_eq!(user.allowed(&perm(&["node", "add"]), None, None), Some(true));
        assert_eq!(user.allowed(&perm(&["node", "add"]), None, Some(&gate)), Some(false));
    }

    #[test]
    fn confirm_fails_with_auth_deny_naming_user_and_gate() {
        let user = User::new_detached(UserIden::generate(), "alice");
        let gate = GateIden::from_string("g1");
        let err = user.confirm(&perm(&["node", "add"]), None, Some(&gate)).unwrap_err();
        match err {
            Error::AuthDeny { user: denied_user, gate: denied_gate, .. } => {
                assert_eq!(denied_user, user.iden());
                assert_eq!(denied_gate, Some(gate));
            }
            other => panic!("expected AuthDeny, got {other:?}"),
        }
    }

    #[test]
    fn setting_a_rule_does_not_invalidate_a_stale_cached_decision() {
        let user = User::new_detached(UserIden::generate(), "alice");
        assert_eq!(user.allowed(&perm(&["node", "add"]), Some(false), None), Some(false));
        user.set_rules(vec![Rule::new(true, ["node"])]);
        assert_eq!(user.allowed(&perm(&["node", "add"]), Some(false), None), Some(false));
        user.clear_cache();
        assert_eq!(user.allowed(&perm(&["node", "add"]), Some(false), None), Some(true));
    }

    #[test]
    fn try_passwd_round_trips_and_rejects_wrong_password() {
        let user = User::new_detached(UserIden::generate(), "alice");
        user.set_passwd("hunter2").unwrap();
        assert!(user.try_passwd("hunter2"));
        assert!(!user.try_passwd("wrong"));
    }

    #[test]
    fn set_passwd_rejects_empty_string() {
        let user = User::new_detached(UserIden::generate(), "alice");
        assert!(matches!(user.set_passwd(""), Err(Error::BadArg(_))));
    }

    #[test]
    fn locked_user_always_fails_passwd_check() {
        let user = User::new_detached(UserIden::generate(), "alice");
        user.set_passwd("hunter2").unwrap();
        user.set_locked(true);
        assert!(!user.try_passwd("hunter2"));
    }
}
