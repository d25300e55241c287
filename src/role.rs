use std::cell::RefCell;
use std::rc::Rc;

use crate::ids::{GateIden, RoleIden};
use crate::rule::{Perm, Rule};
use crate::ruler::{GateOverlay, Ruler, RulerState, SharedOverlay};

struct RoleInner {
    iden: RoleIden,
    name: String,
    ruler: RulerState,
}

/// A named bag of rules that users may be granted (§2, §3).
///
/// Cheaply cloneable: `Role` is a handle (`Rc<RefCell<..>>`) onto shared
/// state, mirroring the arena-with-idens model in §9 where `Auth`, the
/// holding users, and any `AuthGate` overlay all reference the same
/// underlying object rather than copies of it.
#[derive(Clone)]
pub struct Role {
    inner: Rc<RefCell<RoleInner>>,
}

impl Role {
    pub(crate) fn new(iden: RoleIden, name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RoleInner {
                iden,
                name: name.into(),
                ruler: RulerState::new(),
            })),
        }
    }

    pub fn iden(&self) -> RoleIden {
        self.inner.borrow().iden.clone()
    }

    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    pub(crate) fn set_name(&self, name: impl Into<String>) {
        self.inner.borrow_mut().name = name.into();
    }

    pub fn is_admin(&self, gate: Option<&GateIden>) -> bool {
        self.local_admin(gate)
    }

    pub fn rules(&self, gate: Option<&GateIden>) -> Vec<Rule> {
        self.local_rules(gate)
    }

    pub(crate) fn set_admin(&self, admin: bool) {
        self.inner.borrow_mut().ruler.admin = admin;
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

    /// The gate identifiers this role currently has an overlay on, for
    /// cascading cleanup when the role or a gate is deleted.
    pub(crate) fn attached_gate_idens(&self) -> Vec<GateIden> {
        self.inner.borrow().ruler.authgates.keys().cloned().collect()
    }

    /// Lazily materializes this role's overlay for `gate`, sharing the
    /// handle with the owning [`crate::gate::AuthGate`].
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
}

impl Ruler for Role {
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

    #[test]
    fn fresh_role_has_no_rules_and_is_not_admin() {
        let role = Role::new(RoleIden::generate(), "ops");
        assert!(role.rules(None).is_empty());
        assert!(!role.is_admin(None));
    }

    #[test]
    fn set_rules_is_observed_by_rules_accessor() {
        let role = Role::new(RoleIden::generate(), "ops");
        role.set_rules(vec![Rule::new(false, ["node", "del"])]);
        assert_eq!(role.rules(None).len(), 1);
    }

    #[test]
    fn gate_overlay_is_independent_of_global_rules() {
        let role = Role::new(RoleIden::generate(), "ops");
        let gate = GateIden::from_string("g1");
        role.set_rules(vec![Rule::new(true, ["node"])]);
        role.set_gate_rules(&gate, vec![Rule::new(false, ["node"])]);

        assert!(role.rules(None)[0].allow);
        assert!(!role.rules(Some(&gate))[0].allow);
    }
}
