//! Leases: in-flight markers that keep an entity out of matching while an
//! asynchronous path lookup for it is pending.
//!
//! A [`Lease`] is released when it is dropped, so every exit path of a lookup
//! (commit, revert, lost race, panic unwinding through the task) frees it
//! exactly once.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::fleet::{BusId, PassengerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeaseKey {
    /// Bus is being dispatched to a passenger.
    Bus(BusId),
    /// Passenger is being matched to a bus.
    Passenger(PassengerId),
    /// Bus is resolving a cruising path; does not block dispatch.
    Cruise(BusId),
}

#[derive(Debug, Clone, Default)]
pub struct LeaseMap {
    held: Arc<Mutex<HashSet<LeaseKey>>>,
}

impl LeaseMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<LeaseKey>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the lease for `key`, or `None` if someone already holds it.
    pub fn try_acquire(&self, key: LeaseKey) -> Option<Lease> {
        if self.lock().insert(key) {
            Some(Lease {
                key,
                map: self.clone(),
            })
        } else {
            None
        }
    }

    /// Take both leases or neither.
    pub fn try_acquire_pair(&self, first: LeaseKey, second: LeaseKey) -> Option<(Lease, Lease)> {
        let mut held = self.lock();
        if first == second || held.contains(&first) || held.contains(&second) {
            return None;
        }
        held.insert(first);
        held.insert(second);
        drop(held);
        Some((
            Lease {
                key: first,
                map: self.clone(),
            },
            Lease {
                key: second,
                map: self.clone(),
            },
        ))
    }

    pub fn is_held(&self, key: LeaseKey) -> bool {
        self.lock().contains(&key)
    }

    pub fn held_count(&self) -> usize {
        self.lock().len()
    }

    /// Copy of the currently held keys, for use alongside a fleet snapshot.
    pub fn snapshot(&self) -> HashSet<LeaseKey> {
        self.lock().clone()
    }

    fn release(&self, key: LeaseKey) {
        self.lock().remove(&key);
    }
}

/// Scoped ownership of one lease key.
#[derive(Debug)]
pub struct Lease {
    key: LeaseKey,
    map: LeaseMap,
}

impl Lease {
    pub fn key(&self) -> LeaseKey {
        self.key
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.map.release(self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_is_exclusive_until_dropped() {
        let leases = LeaseMap::new();
        let key = LeaseKey::Bus(BusId(1));
        let lease = leases.try_acquire(key).expect("first acquire");
        assert!(leases.try_acquire(key).is_none());
        drop(lease);
        assert!(!leases.is_held(key));
        assert!(leases.try_acquire(key).is_some());
    }

    #[test]
    fn pair_acquire_is_all_or_nothing() {
        let leases = LeaseMap::new();
        let bus = LeaseKey::Bus(BusId(1));
        let passenger = LeaseKey::Passenger(PassengerId(1));
        let _held = leases.try_acquire(passenger).expect("passenger lease");

        assert!(leases.try_acquire_pair(bus, passenger).is_none());
        assert!(!leases.is_held(bus), "bus lease must not leak on partial failure");
    }

    #[test]
    fn cruise_and_dispatch_keys_are_independent() {
        let leases = LeaseMap::new();
        let _cruise = leases.try_acquire(LeaseKey::Cruise(BusId(3))).expect("cruise");
        assert!(leases.try_acquire(LeaseKey::Bus(BusId(3))).is_some());
    }
}
