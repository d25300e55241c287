use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ids::GateIden;
use crate::rule::{first_match, Perm, Rule};

/// The `{admin, rules}` pair a principal holds on one specific gate.
///
/// Co-owned: both the owning [`crate::user::User`]/[`crate::role::Role`]
/// and the [`crate::gate::AuthGate`] hold a handle to the same overlay, so
/// a mutation made through either side is observed by the other (§3).
#[derive(Debug, Default)]
pub struct GateOverlay {
    pub admin: bool,
    pub rules: Vec<Rule>,
}

pub type SharedOverlay = Rc<RefCell<GateOverlay>>;

/// Shared state for any rule-bearing entity ("Ruler" in the original):
/// a rule list, an admin flag, and the per-gate overlays it has been
/// given. `User` and `Role` both embed this by composition rather than
/// inheritance and expose it through the [`Ruler`] capability.
#[derive(Debug, Default)]
pub(crate) struct RulerState {
    pub admin: bool,
    pub rules: Vec<Rule>,
    pub authgates: HashMap<GateIden, SharedOverlay>,
}

impl RulerState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn gate_overlay(&self, gate: &GateIden) -> Option<SharedOverlay> {
        self.authgates.get(gate).cloned()
    }
}

/// The common rule-bearing capability shared by users and roles: read the
/// local rule list and admin flag, optionally scoped to a gate.
///
/// This replaces the original's `HiveRuler` base class: instead of
/// inheritance, `User` and `Role` each embed a [`RulerState`] and expose
/// it through this trait's required [`Ruler::ruler_state`] accessor, with
/// the shared read-only behavior implemented once as default methods.
pub(crate) trait Ruler {
    fn with_ruler_state<R>(&self, f: impl FnOnce(&RulerState) -> R) -> R;
    fn with_ruler_state_mut<R>(&self, f: impl FnOnce(&mut RulerState) -> R) -> R;

    /// Local rules, optionally scoped to a gate overlay. Returns an empty
    /// list when scoped to a gate the principal has no overlay on.
    fn local_rules(&self, gate: Option<&GateIden>) -> Vec<Rule> {
        self.with_ruler_state(|state| match gate {
            None => state.rules.clone(),
            Some(gate) => state
                .gate_overlay(gate)
                .map(|overlay| overlay.borrow().rules.clone())
                .unwrap_or_default(),
        })
    }

    /// Whether this principal is admin globally, or on the given gate.
    fn local_admin(&self, gate: Option<&GateIden>) -> bool {
        self.with_ruler_state(|state| match gate {
            None => state.admin,
            Some(gate) => state
                .gate_overlay(gate)
                .map(|overlay| overlay.borrow().admin)
                .unwrap_or(false),
        })
    }

    /// Scans local rules (scoped to `gate` if given) for the first prefix
    /// match against `perm`.
    fn local_first_match(&self, perm: &Perm, gate: Option<&GateIden>) -> Option<bool> {
        let rules = self.local_rules(gate);
        first_match(&rules, perm)
    }

    /// Appends `rule` to the local rule list, or to `gate`'s overlay if
    /// given, materializing the overlay if this principal has none yet
    /// (`HiveRuler.addRule`).
    fn local_add_rule(&self, rule: Rule, gate: Option<&GateIden>) {
        self.with_ruler_state_mut(|state| match gate {
            None => state.rules.push(rule),
            Some(gate) => {
                let overlay = state
                    .authgates
                    .entry(gate.clone())
                    .or_insert_with(|| Rc::new(RefCell::new(GateOverlay::default())));
                overlay.borrow_mut().rules.push(rule);
            }
        })
    }

    /// Removes the first rule equal to `rule` from the local list, or from
    /// `gate`'s overlay if given (`HiveRuler.delRule`). Returns whether a
    /// rule was actually removed.
    fn local_del_rule(&self, rule: &Rule, gate: Option<&GateIden>) -> bool {
        self.with_ruler_state_mut(|state| match gate {
            None => match state.rules.iter().position(|r| r == rule) {
                Some(pos) => {
                    state.rules.remove(pos);
                    true
                }
                None => false,
            },
            Some(gate) => match state.authgates.get(gate) {
                Some(overlay) => {
                    let mut overlay = overlay.borrow_mut();
                    match overlay.rules.iter().position(|r| r == rule) {
                        Some(pos) => {
                            overlay.rules.remove(pos);
                            true
                        }
                        None => false,
                    }
                }
                None => false,
            },
        })
    }
}
