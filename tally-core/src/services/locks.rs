//! Per-owner mutual exclusion
//!
//! Balance updates are read-modify-write sequences spread over several
//! repository calls. Holding the owner's lock for the whole sequence keeps
//! two mutations for the same user from both reading the same starting
//! balance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

/// Hands out one mutex per owner id
#[derive(Default)]
pub struct OwnerLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, owner: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(owner).or_default())
    }

    /// Drop the entries no other caller holds or waits on
    ///
    /// Clones are only handed out under the map lock, so a count of one
    /// here means the map owns the last reference.
    fn release(&self, owners: &[Uuid]) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        for owner in owners {
            if locks.get(owner).is_some_and(|m| Arc::strong_count(m) == 1) {
                locks.remove(owner);
            }
        }
    }

    /// Run `f` while holding the lock of every listed owner
    ///
    /// Locks are taken in ascending id order, so two callers naming the same
    /// pair of owners cannot deadlock. Duplicates are locked once. Entries
    /// are evicted once unused, so the map only holds owners in flight.
    pub fn run<T>(&self, owners: &[Uuid], f: impl FnOnce() -> T) -> T {
        let mut ordered = owners.to_vec();
        ordered.sort();
        ordered.dedup();

        let result = {
            let mutexes: Vec<Arc<Mutex<()>>> = ordered.iter().map(|id| self.lock_for(*id)).collect();
            // The mutexes guard no data, so poisoning is ignored
            let _guards: Vec<MutexGuard<'_, ()>> = mutexes
                .iter()
                .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
                .collect();
            f()
        };

        self.release(&ordered);
        result
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
