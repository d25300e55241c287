use std::collections::{HashMap, VecDeque};

use crate::ids::GateIden;
use crate::rule::Perm;

/// Key for a memoized decision: the permission path, the caller-supplied
/// default, and the optional gate the query was scoped to.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
struct CacheKey {
    perm: Perm,
    default: Option<bool>,
    gate: Option<GateIden>,
}

/// Bounded, per-user LRU cache of `(perm, default, gate) -> decision`.
///
/// Single-owner by construction (it lives inside a [`std::cell::RefCell`]
/// on the owning user, per the cooperative single-thread model), so unlike
/// the teacher's sharded `MemoryCache` this needs no locking of its own.
/// A memoized decision is itself an `Option<bool>`: `None` means the query
/// fell through every rule and the caller's `default` applies, which is a
/// determinate, cacheable outcome just like an explicit allow/deny.
#[derive(Debug)]
pub(crate) struct DecisionCache {
    capacity: usize,
    entries: HashMap<CacheKey, Option<bool>>,
    order: VecDeque<CacheKey>,
}

impl DecisionCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns `Some(decision)` on a cache hit (`decision` may itself be
    /// `None`, meaning "falls through to default"), or `None` on a miss.
    pub(crate) fn get(
        &mut self,
        perm: &Perm,
        default: Option<bool>,
        gate: Option<&GateIden>,
    ) -> Option<Option<bool>> {
        if self.capacity == 0 {
            return None;
        }
        let key = CacheKey {
            perm: perm.clone(),
            default,
            gate: gate.cloned(),
        };
        let found = self.entries.get(&key).copied();
        if found.is_some() {
            self.touch(&key);
        }
        found
    }

    pub(crate) fn set(
        &mut self,
        perm: &Perm,
        default: Option<bool>,
        gate: Option<&GateIden>,
        decision: Option<bool>,
    ) {
        if self.capacity == 0 {
            return;
        }
        let key = CacheKey {
            perm: perm.clone(),
            default,
            gate: gate.cloned(),
        };
        self.entries.insert(key.clone(), decision);
        self.touch(&key);
        self.evict_if_needed();
    }

    /// Clears every memoized decision. Must run to completion before any
    /// mutation that could have changed a decision is considered applied.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn touch(&mut self, key: &CacheKey) {
        self.order.retain(|existing| existing != key);
        self.order.push_back(key.clone());
    }

    fn evict_if_needed(&mut self) {
        while self.entries.len() > self.capacity {
            if let Some(key) = self.order.pop_front() {
                self.entries.remove(&key);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(segments: &[&str]) -> Perm {
        Perm::new(segments.iter().map(|s| s.to_string()))
    }

    #[test]
    fn miss_then_hit() {
        let mut cache = DecisionCache::new(4);
        assert_eq!(cache.get(&perm(&["a"]), None, None), None);
        cache.set(&perm(&["a"]), None, None, Some(true));
        assert_eq!(cache.get(&perm(&["a"]), None, None), Some(Some(true)));
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let mut cache = DecisionCache::new(2);
        cache.set(&perm(&["a"]), None, None, Some(true));
        cache.set(&perm(&["b"]), None, None, Some(true));
        let _ = cache.get(&perm(&["a"]), None, None);
        cache.set(&perm(&["c"]), None, None, Some(true));

        assert_eq!(cache.get(&perm(&["b"]), None, None), None);
        assert_eq!(cache.get(&perm(&["a"]), None, None), Some(Some(true)));
        assert_eq!(cache.get(&perm(&["c"]), None, None), Some(Some(true)));
    }

    #[test]
    fn clear_drops_everything() {
        let mut cache = DecisionCache::new(4);
        cache.set(&perm(&["a"]), None, None, Some(true));
        cache.clear();
        assert_eq!(cache.get(&perm(&["a"]), None, None), None);
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let mut cache = DecisionCache::new(0);
        cache.set(&perm(&["a"]), None, None, Some(true));
        assert_eq!(cache.get(&perm(&["a"]), None, None), None);
    }

    #[test]
    fn a_fallthrough_to_default_is_itself_cacheable() {
        let mut cache = DecisionCache::new(4);
        cache.set(&perm(&["a"]), None, None, None);
        assert_eq!(cache.get(&perm(&["a"]), None, None), Some(None));
    }
}
