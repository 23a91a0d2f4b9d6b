// ── Central reactive data store ──
//
// Holds the raw inputs of one key session (user + relations, device
// telemetry, presence) and the derived rows. Every input change triggers
// a full recompute of fusion and projection; rows are never patched in
// place.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use super::{DataSource, Freshness};
use crate::error::CoreError;
use crate::model::{
    AccessKeyRow, DeviceTelemetrySample, InboundId, PresenceSnapshot, RelationId, UserDetail,
    UserId, UserInboundRelation,
};
use crate::presence::PresenceFusion;
use crate::projection::project_rows;
use crate::stream::RowStream;

/// Reactive store for a single user at a time.
///
/// Inputs tagged with another user id are dropped, so results that arrive
/// after a user switch can never leak into the new user's rows.
pub struct DataStore {
    user_id: watch::Sender<Option<UserId>>,
    user: watch::Sender<Option<Arc<UserDetail>>>,
    telemetry: watch::Sender<Arc<Vec<DeviceTelemetrySample>>>,
    presence: watch::Sender<Option<PresenceSnapshot>>,
    fusion: ArcSwap<PresenceFusion>,
    rows: watch::Sender<Arc<Vec<AccessKeyRow>>>,
    freshness: watch::Sender<Freshness>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    pub fn new() -> Self {
        let (user_id, _) = watch::channel(None);
        let (user, _) = watch::channel(None);
        let (telemetry, _) = watch::channel(Arc::new(Vec::new()));
        let (presence, _) = watch::channel(None);
        let (rows, _) = watch::channel(Arc::new(Vec::new()));
        let (freshness, _) = watch::channel(Freshness::default());

        Self {
            user_id,
            user,
            telemetry,
            presence,
            fusion: ArcSwap::from_pointee(PresenceFusion::default()),
            rows,
            freshness,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Drop everything and start tracking `user` (or nothing).
    pub fn reset(&self, user: Option<UserId>) {
        self.user_id.send_replace(user);
        self.user.send_replace(None);
        self.telemetry.send_replace(Arc::new(Vec::new()));
        self.presence.send_replace(None);
        self.freshness.send_replace(Freshness::default());
        self.recompute();
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.user_id.borrow().clone()
    }

    fn is_current(&self, user: &UserId) -> bool {
        self.user_id.borrow().as_ref() == Some(user)
    }

    // ── Inputs ───────────────────────────────────────────────────────

    /// Replace the user and its relations. Returns `false` if dropped.
    pub fn apply_user(&self, detail: UserDetail) -> bool {
        if !self.is_current(&detail.id) {
            debug!(user = %detail.id, "dropping user detail for inactive user");
            return false;
        }
        self.user.send_replace(Some(Arc::new(detail)));
        self.mark_fresh(DataSource::Relations);
        self.recompute();
        true
    }

    /// Replace device telemetry. Returns `false` if dropped.
    pub fn apply_telemetry(&self, user: &UserId, samples: Vec<DeviceTelemetrySample>) -> bool {
        if !self.is_current(user) {
            debug!(user = %user, "dropping telemetry for inactive user");
            return false;
        }
        self.telemetry.send_replace(Arc::new(samples));
        self.mark_fresh(DataSource::Telemetry);
        self.recompute();
        true
    }

    /// Take the current user's entry from a presence frame.
    ///
    /// A frame without the user means the user is offline; the last known
    /// `last_seen_at` is kept.
    pub fn apply_presence(&self, snapshots: &[PresenceSnapshot]) -> bool {
        let Some(user) = self.current_user() else {
            return false;
        };
        let snapshot = snapshots
            .iter()
            .find(|p| p.user_id == user)
            .cloned()
            .unwrap_or_else(|| PresenceSnapshot {
                last_seen_at: self
                    .presence
                    .borrow()
                    .as_ref()
                    .and_then(|p| p.last_seen_at),
                user_id: user,
                online: false,
            });

        let changed = self.presence.send_if_modified(|cur| {
            if cur.as_ref() == Some(&snapshot) {
                false
            } else {
                *cur = Some(snapshot);
                true
            }
        });
        self.mark_fresh(DataSource::Presence);
        if changed {
            self.recompute();
        }
        true
    }

    /// Record a failed fetch. Existing data is kept but flagged stale.
    pub fn mark_failed(&self, source: DataSource, error: &CoreError) {
        self.freshness.send_modify(|f| {
            let entry = f.get_mut(source);
            entry.stale = true;
            entry.last_error = Some(error.to_string());
        });
    }

    fn mark_fresh(&self, source: DataSource) {
        self.freshness.send_modify(|f| {
            let entry = f.get_mut(source);
            entry.last_success_at = Some(Utc::now());
            entry.stale = false;
            entry.last_error = None;
        });
    }

    // ── Derivation ───────────────────────────────────────────────────

    /// Re-run fusion and projection from the current inputs.
    pub fn recompute(&self) {
        let user = self.user.borrow().clone();
        let telemetry = self.telemetry.borrow().clone();
        let presence = self.presence.borrow().clone();

        let (fusion, rows) = match user.as_deref() {
            Some(detail) => {
                let fusion =
                    PresenceFusion::compute(&telemetry, presence.as_ref(), &detail.relations);
                let rows = project_rows(
                    &detail.relations,
                    &fusion,
                    detail.expiration_days(Utc::now()),
                );
                (fusion, rows)
            }
            None => (PresenceFusion::default(), Vec::new()),
        };

        self.fusion.store(Arc::new(fusion));
        self.rows.send_replace(Arc::new(rows));
    }

    // ── Snapshots ────────────────────────────────────────────────────

    pub fn user(&self) -> Option<Arc<UserDetail>> {
        self.user.borrow().clone()
    }

    pub fn telemetry(&self) -> Arc<Vec<DeviceTelemetrySample>> {
        self.telemetry.borrow().clone()
    }

    pub fn presence(&self) -> Option<PresenceSnapshot> {
        self.presence.borrow().clone()
    }

    pub fn fusion(&self) -> Arc<PresenceFusion> {
        self.fusion.load_full()
    }

    pub fn rows(&self) -> Arc<Vec<AccessKeyRow>> {
        self.rows.borrow().clone()
    }

    pub fn subscribe_rows(&self) -> RowStream {
        RowStream::new(self.rows.subscribe())
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness.borrow().clone()
    }

    pub fn subscribe_freshness(&self) -> watch::Receiver<Freshness> {
        self.freshness.subscribe()
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn relation(&self, id: RelationId) -> Option<UserInboundRelation> {
        self.user.borrow().as_ref()?.relation(id).cloned()
    }

    pub fn relation_by_inbound(&self, inbound: InboundId) -> Option<UserInboundRelation> {
        self.user
            .borrow()
            .as_ref()?
            .relation_by_inbound(inbound)
            .cloned()
    }
}
