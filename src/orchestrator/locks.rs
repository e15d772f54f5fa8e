//! Operation exclusivity
//!
//! One lifecycle operation per instance, one failover or demotion per herd.
//! A conflicting request is refused immediately; nothing waits.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::inventory::{HerdId, InstanceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKey {
    Instance(InstanceId),
    Herd(HerdId),
}

/// Held keys, released when the guard drops.
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashSet<LockKey>>,
}

/// Proof of exclusive access; dropping it releases every key it took.
#[derive(Debug)]
pub struct LockGuard<'a> {
    table: &'a LockTable,
    keys: Vec<LockKey>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<LockKey>> {
        // The set stays consistent even if a holder panicked.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take one instance. Fails while the instance or its herd is held.
    pub fn lock_instance(&self, herd: HerdId, id: InstanceId) -> OrchestratorResult<LockGuard<'_>> {
        let mut held = self.held();
        if held.contains(&LockKey::Herd(herd)) {
            return Err(OrchestratorError::busy(format!(
                "herd {} has a failover or demotion in progress",
                herd
            ))
            .for_instance(id));
        }
        if !held.insert(LockKey::Instance(id)) {
            return Err(
                OrchestratorError::busy("another operation is in progress").for_instance(id)
            );
        }
        Ok(LockGuard {
            table: self,
            keys: vec![LockKey::Instance(id)],
        })
    }

    /// Take a herd and every listed member, all or nothing.
    pub fn lock_herd(
        &self,
        herd: HerdId,
        members: &[InstanceId],
    ) -> OrchestratorResult<LockGuard<'_>> {
        let mut held = self.held();
        if held.contains(&LockKey::Herd(herd)) {
            return Err(OrchestratorError::busy(format!(
                "herd {} has a failover or demotion in progress",
                herd
            )));
        }
        if let Some(busy) = members
            .iter()
            .find(|id| held.contains(&LockKey::Instance(**id)))
        {
            return Err(OrchestratorError::busy(format!(
                "member {} of herd {} is busy",
                busy, herd
            ))
            .for_instance(*busy));
        }

        let mut keys = vec![LockKey::Herd(herd)];
        keys.extend(members.iter().map(|id| LockKey::Instance(*id)));
        for key in &keys {
            held.insert(*key);
        }
        Ok(LockGuard { table: self, keys })
    }

    pub fn is_instance_locked(&self, id: InstanceId) -> bool {
        self.held().contains(&LockKey::Instance(id))
    }

    pub fn is_herd_locked(&self, herd: HerdId) -> bool {
        self.held().contains(&LockKey::Herd(herd))
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.table.held();
        for key in &self.keys {
            held.remove(key);
        }
    }
}
