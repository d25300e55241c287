use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ids::{GateIden, RoleIden, UserIden};
use crate::role::Role;
use crate::ruler::{GateOverlay, SharedOverlay};
use crate::user::User;

struct GateInner {
    iden: GateIden,
    gate_type: String,
    gateusers: HashMap<UserIden, SharedOverlay>,
    gateroles: HashMap<RoleIden, SharedOverlay>,
}

/// A per-object overlay onto one externally-owned object (§3): the set of
/// users and roles that have been given gate-scoped rules or admin on it.
///
/// `iden` matches the external object's own identifier; `gate_type` is a
/// caller-chosen label checked for consistency against what's already
/// persisted (`Error::InconsistentStorage`, §7) rather than interpreted by
/// this crate.
#[derive(Clone)]
pub struct AuthGate {
    inner: Rc<RefCell<GateInner>>,
}

impl AuthGate {
    pub(crate) fn new(iden: GateIden, gate_type: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(GateInner {
                iden,
                gate_type: gate_type.into(),
                gateusers: HashMap::new(),
                gateroles: HashMap::new(),
            })),
        }
    }

    pub fn iden(&self) -> GateIden {
        self.inner.borrow().iden.clone()
    }

    pub fn gate_type(&self) -> String {
        self.inner.borrow().gate_type.clone()
    }

    pub(crate) fn user_idens(&self) -> Vec<UserIden> {
        self.inner.borrow().gateusers.keys().cloned().collect()
    }

    pub(crate) fn role_idens(&self) -> Vec<RoleIden> {
        self.inner.borrow().gateroles.keys().cloned().collect()
    }

    /// Materializes (or returns the existing) overlay this gate and `user`
    /// share, attaching it to both sides.
    pub(crate) fn ensure_user_overlay(&self, user: &User) -> SharedOverlay {
        if let Some(existing) = self.inner.borrow().gateusers.get(&user.iden()) {
            return existing.clone();
        }
        let overlay: SharedOverlay = Rc::new(RefCell::new(GateOverlay::default()));
        self.inner
            .borrow_mut()
            .gateusers
            .insert(user.iden(), overlay.clone());
        user.attach_gate_overlay(self.iden(), overlay.clone());
        overlay
    }

    /// Materializes (or returns the existing) overlay this gate and `role`
    /// share, attaching it to both sides.
    pub(crate) fn ensure_role_overlay(&self, role: &Role) -> SharedOverlay {
        if let Some(existing) = self.inner.borrow().gateroles.get(&role.iden()) {
            return existing.clone();
        }
        let overlay: SharedOverlay = Rc::new(RefCell::new(GateOverlay::default()));
        self.inner
            .borrow_mut()
            .gateroles
            .insert(role.iden(), overlay.clone());
        role.attach_gate_overlay(self.iden(), overlay.clone());
        overlay
    }

    /// Detaches the overlay this gate shares with `user`, from both sides.
    pub(crate) fn revoke_user_overlay(&self, user: &User) {
        self.inner.borrow_mut().gateusers.remove(&user.iden());
        user.detach_gate_overlay(&self.iden());
    }

    /// Detaches the overlay this gate shares with `role`, from both sides.
    pub(crate) fn revoke_role_overlay(&self, role: &Role) {
        self.inner.borrow_mut().gateroles.remove(&role.iden());
        role.detach_gate_overlay(&self.iden());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_user_overlay_is_idempotent() {
        let gate = AuthGate::new(GateIden::generate(), "node");
        let user = User::new_detached(UserIden::generate(), "alice");

        let first = gate.ensure_user_overlay(&user);
        first.borrow_mut().admin = true;
        let second = gate.ensure_user_overlay(&user);

        assert!(second.borrow().admin);
        assert_eq!(gate.user_idens(), vec![user.iden()]);
    }

    #[test]
    fn revoke_user_overlay_detaches_both_sides() {
        let gate = AuthGate::new(GateIden::generate(), "node");
        let user = User::new_detached(UserIden::generate(), "alice");

        gate.ensure_user_overlay(&user);
        gate.revoke_user_overlay(&user);

        assert!(gate.user_idens().is_empty());
        assert!(user.gate_overlay(&gate.iden()).is_none());
    }
}
