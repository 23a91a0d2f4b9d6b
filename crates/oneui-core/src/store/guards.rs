// ── Per-relation mutation guards ──
//
// A relation being toggled, re-prioritised, or moved by a drop refuses
// further changes until the pending one settles. Leases release on drop,
// so every exit path (success, error, cancellation) clears the guard.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::CoreError;
use crate::model::RelationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MutationState {
    #[default]
    Idle,
    /// Single-relation change (toggle, priority).
    Mutating,
    /// Part of a batch reorder.
    Applying,
}

#[derive(Debug, Clone, Default)]
pub struct MutationGuards {
    active: Arc<DashMap<RelationId, MutationState>>,
}

impl MutationGuards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: RelationId) -> MutationState {
        self.active.get(&id).map(|s| *s.value()).unwrap_or_default()
    }

    pub fn is_busy(&self, id: RelationId) -> bool {
        self.active.contains_key(&id)
    }

    /// Relations with a change in flight.
    pub fn busy(&self) -> Vec<RelationId> {
        let mut ids: Vec<RelationId> = self.active.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn try_lease(&self, id: RelationId, state: MutationState) -> Result<MutationLease, CoreError> {
        match self.active.entry(id) {
            Entry::Occupied(_) => Err(CoreError::RelationBusy {
                relation_id: id.get(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(state);
                Ok(MutationLease {
                    active: Arc::clone(&self.active),
                    id,
                })
            }
        }
    }

    /// Lease every relation or none of them.
    pub fn try_lease_all(
        &self,
        ids: &[RelationId],
        state: MutationState,
    ) -> Result<Vec<MutationLease>, CoreError> {
        ids.iter().map(|&id| self.try_lease(id, state)).collect()
    }
}

#[derive(Debug)]
pub struct MutationLease {
    active: Arc<DashMap<RelationId, MutationState>>,
    id: RelationId,
}

impl MutationLease {
    pub fn relation_id(&self) -> RelationId {
        self.id
    }
}

impl Drop for MutationLease {
    fn drop(&mut self) {
        self.active.remove(&self.id);
    }
}
