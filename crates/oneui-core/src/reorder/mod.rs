// ── Server-side reorder workflows ──
//
// Pattern and quality reorders are computed by the panel. Every real
// write is preceded by a dry run whose result is shown for confirmation;
// confirming asks the panel to recompute rather than replaying the
// preview. At most one reorder of any kind runs per user at a time.

pub mod bulk;
pub mod pattern;
pub mod quality;

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{ReorderPreview, UserId};

pub use bulk::{BulkPlan, BulkReorderCoordinator, BulkStrategy};
pub use pattern::{PatternPolicy, PatternReorderWorkflow, ProfileRule};
pub use quality::QualityReorderWorkflow;

/// Which reorder currently holds a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ReorderKind {
    Drag,
    Pattern,
    Quality,
    Bulk,
}

// ── ReorderLock ─────────────────────────────────────────────────────

/// Per-user reorder exclusion, shared by every workflow and session that
/// may touch the same users.
#[derive(Debug, Clone, Default)]
pub struct ReorderLock {
    active: Arc<DashMap<UserId, ReorderKind>>,
}

impl ReorderLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The reorder currently running for `user`, if any.
    pub fn active(&self, user: &UserId) -> Option<ReorderKind> {
        self.active.get(user).map(|k| *k.value())
    }

    pub fn is_locked(&self, user: &UserId) -> bool {
        self.active.contains_key(user)
    }

    /// Claim `user` for a reorder. Released when the lease drops.
    pub fn try_acquire(&self, user: &UserId, kind: ReorderKind) -> Result<ReorderLease, CoreError> {
        match self.active.entry(user.clone()) {
            Entry::Occupied(held) => {
                debug!(user = %user, held = %held.get(), wanted = %kind, "reorder refused");
                Err(CoreError::ReorderInFlight {
                    user_id: user.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(kind);
                Ok(ReorderLease {
                    active: Arc::clone(&self.active),
                    user: user.clone(),
                })
            }
        }
    }

    /// Claim every user or none of them.
    pub fn try_acquire_all(
        &self,
        users: &[UserId],
        kind: ReorderKind,
    ) -> Result<Vec<ReorderLease>, CoreError> {
        users
            .iter()
            .map(|user| self.try_acquire(user, kind))
            .collect()
    }
}

/// Held while a reorder is in flight for one user.
#[derive(Debug)]
pub struct ReorderLease {
    active: Arc<DashMap<UserId, ReorderKind>>,
    user: UserId,
}

impl Drop for ReorderLease {
    fn drop(&mut self) {
        self.active.remove(&self.user);
    }
}

// ── PendingReorder ──────────────────────────────────────────────────

/// A dry-run result awaiting confirmation.
///
/// Only the workflows create these, so a real write can never happen
/// without a preview having been produced first.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReorder {
    preview: ReorderPreview,
}

impl PendingReorder {
    pub(crate) fn new(preview: ReorderPreview) -> Self {
        Self { preview }
    }

    pub fn preview(&self) -> &ReorderPreview {
        &self.preview
    }

    pub fn user_id(&self) -> &UserId {
        &self.preview.user_id
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let lock = ReorderLock::new();
        let user = UserId::from("7");

        let lease = lock.try_acquire(&user, ReorderKind::Pattern).unwrap();
        assert_eq!(lock.active(&user), Some(ReorderKind::Pattern));

        let err = lock.try_acquire(&user, ReorderKind::Quality).unwrap_err();
        assert!(matches!(err, CoreError::ReorderInFlight { .. }));

        drop(lease);
        assert!(!lock.is_locked(&user));
        assert!(lock.try_acquire(&user, ReorderKind::Quality).is_ok());
    }

    #[test]
    fn acquire_all_is_all_or_nothing() {
        let lock = ReorderLock::new();
        let busy = UserId::from("2");
        let _held = lock.try_acquire(&busy, ReorderKind::Drag).unwrap();

        let users = ["1", "2", "3"].map(UserId::from);
        assert!(lock.try_acquire_all(&users, ReorderKind::Bulk).is_err());
        assert!(!lock.is_locked(&users[0]));
        assert!(!lock.is_locked(&users[2]));
    }

    #[test]
    fn locks_are_shared_between_clones() {
        let lock = ReorderLock::new();
        let other = lock.clone();
        let user = UserId::from("9");

        let _lease = lock.try_acquire(&user, ReorderKind::Drag).unwrap();
        assert!(other.is_locked(&user));
    }
}
