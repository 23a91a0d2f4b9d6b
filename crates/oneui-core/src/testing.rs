// ── In-memory panel for unit tests ──
//
// Keeps users in a map and recomputes pattern and quality orders the way
// the panel does (stable, contiguous from 100), so dry runs after an
// apply report zero changes.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::backend::PanelBackend;
use crate::convert::BULK_PREVIEW_USERS;
use crate::error::CoreError;
use crate::model::{
    BulkReorderSummary, BulkUserDiff, DeviceTelemetrySample, InboundId, InboundMeta, KeyOrder,
    PresenceSnapshot, PreviewDetail, QualityScore, RelationId, ReorderPreview, UserDetail, UserId,
    UserInboundRelation,
};
use crate::presence_channel::PresenceFeed;
use crate::priority::{DEFAULT_PRIORITY_BASE, PriorityAssignment};
use crate::reorder::pattern::{MYANMAR_PATTERN, PatternPolicy};

// ── Fixtures ────────────────────────────────────────────────────────

pub(crate) fn relation(
    id: i64,
    inbound: i64,
    priority: i32,
    protocol: &str,
    network: &str,
    security: &str,
) -> UserInboundRelation {
    let inbound_id = InboundId::new(inbound).unwrap();
    UserInboundRelation {
        id: RelationId::new(id),
        inbound_id: Some(inbound_id),
        enabled: true,
        priority,
        inbound: Some(InboundMeta {
            id: inbound_id,
            protocol: protocol.into(),
            network: Some(network.into()),
            security: Some(security.into()),
            port: 443,
            tag: Some(format!("key-{id}")),
            remark: None,
        }),
    }
}

pub(crate) fn user_with(id: &str, relations: Vec<UserInboundRelation>) -> UserDetail {
    UserDetail {
        id: id.into(),
        username: Some(format!("user-{id}")),
        email: None,
        expires_at: None,
        relations,
    }
}

// ── FakePanel ───────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct FakeState {
    pub users: HashMap<UserId, UserDetail>,
    pub devices: HashMap<UserId, Vec<DeviceTelemetrySample>>,
    pub presence: Vec<PresenceSnapshot>,
    pub scores: HashMap<UserId, Vec<(InboundId, f64)>>,
    pub feed: Option<PresenceFeed>,
    pub calls: Vec<String>,
    pub writes: Vec<String>,
    pub batches: Vec<(UserId, Vec<PriorityAssignment>)>,
    pub reject_writes: Option<String>,
    pub fetch_gate: Option<(UserId, Arc<Notify>)>,
}

#[derive(Default)]
pub(crate) struct FakePanel {
    state: Mutex<FakeState>,
}

impl FakePanel {
    pub fn with_user(self, detail: UserDetail) -> Self {
        self.state().users.insert(detail.id.clone(), detail);
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.state().writes.clone()
    }

    pub fn batches(&self) -> Vec<(UserId, Vec<PriorityAssignment>)> {
        self.state().batches.clone()
    }

    pub fn set_scores(&self, user: &str, scores: &[(i64, f64)]) {
        let scores = scores
            .iter()
            .map(|&(id, s)| (InboundId::new(id).unwrap(), s))
            .collect();
        self.state().scores.insert(user.into(), scores);
    }

    pub fn set_presence(&self, user: &str, online: bool) {
        let mut state = self.state();
        state.presence.retain(|p| p.user_id.as_str() != user);
        state.presence.push(PresenceSnapshot {
            user_id: user.into(),
            online,
            last_seen_at: None,
        });
    }

    pub fn set_devices(&self, user: &str, samples: Vec<DeviceTelemetrySample>) {
        self.state().devices.insert(user.into(), samples);
    }

    pub fn set_feed(&self, feed: PresenceFeed) {
        self.state().feed = Some(feed);
    }

    pub fn reject_writes(&self, message: &str) {
        self.state().reject_writes = Some(message.into());
    }

    /// Make the next `fetch_user` for `user` wait until the returned
    /// notify fires.
    pub fn gate_fetch(&self, user: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.state().fetch_gate = Some((user.into(), Arc::clone(&notify)));
        notify
    }

    pub fn relation_priorities(&self, user: &str) -> Vec<(i64, i32)> {
        let state = self.state();
        let mut out: Vec<(i64, i32)> = state
            .users
            .get(&UserId::from(user))
            .map(|u| u.relations.iter().map(|r| (r.id.get(), r.priority)).collect())
            .unwrap_or_default();
        out.sort_by_key(|&(_, p)| p);
        out
    }

    fn record(&self, call: String, write: bool) -> Result<(), CoreError> {
        let mut state = self.state();
        state.calls.push(call.clone());
        if write {
            if let Some(message) = state.reject_writes.clone() {
                return Err(CoreError::Rejected { message });
            }
            state.writes.push(call);
        }
        Ok(())
    }

    fn with_detail<T>(
        &self,
        user: &UserId,
        f: impl FnOnce(&mut UserDetail, &FakeState) -> T,
    ) -> Result<T, CoreError> {
        let mut state = self.state();
        let mut detail = state
            .users
            .remove(user)
            .ok_or_else(|| CoreError::UserNotFound {
                user_id: user.to_string(),
            })?;
        let out = f(&mut detail, &state);
        state.users.insert(user.clone(), detail);
        Ok(out)
    }
}

// ── Panel-side ordering ─────────────────────────────────────────────

struct Replay {
    changed: u32,
    before: Vec<(RelationId, String, i32)>,
    after: Vec<(RelationId, String, i32)>,
}

fn current_order(detail: &UserDetail) -> Vec<(RelationId, String, i32)> {
    let mut rows: Vec<(usize, &UserInboundRelation)> = detail.relations.iter().enumerate().collect();
    rows.sort_by_key(|(i, r)| (r.priority, *i));
    rows.into_iter()
        .map(|(_, r)| (r.id, r.label(), r.priority))
        .collect()
}

fn replay(detail: &mut UserDetail, order: &[RelationId], dry_run: bool) -> Replay {
    let before = current_order(detail);
    let mut changed = 0;
    let mut after = Vec::new();
    let mut priority = DEFAULT_PRIORITY_BASE;
    for id in order {
        let Some(rel) = detail.relations.iter_mut().find(|r| r.id == *id) else {
            continue;
        };
        if rel.priority != priority {
            changed += 1;
        }
        after.push((rel.id, rel.label(), priority));
        if !dry_run {
            rel.priority = priority;
        }
        priority += 1;
    }
    Replay {
        changed,
        before,
        after,
    }
}

fn top3(order: &[(RelationId, String, i32)], detail: &UserDetail) -> Vec<KeyOrder> {
    order
        .iter()
        .take(3)
        .map(|(id, key, priority)| KeyOrder {
            inbound_id: detail.relation(*id).and_then(|r| r.inbound_id),
            key: key.clone(),
            priority: *priority,
        })
        .collect()
}

fn policy_for(pattern: &str) -> PatternPolicy {
    if pattern == MYANMAR_PATTERN {
        PatternPolicy::myanmar()
    } else {
        PatternPolicy {
            name: pattern.into(),
            profiles: Vec::new(),
        }
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap()
}

fn pattern_run(detail: &mut UserDetail, pattern: &str, dry_run: bool) -> ReorderPreview {
    let policy = policy_for(pattern);
    let matched = detail
        .relations
        .iter()
        .filter(|r| policy.matches_relation(r))
        .count();
    let order = policy.arrange(&detail.relations);
    let r = if matched == 0 {
        replay(detail, &[], true)
    } else {
        replay(detail, &order, dry_run)
    };
    ReorderPreview {
        user_id: detail.id.clone(),
        total_keys: count(detail.relations.len()),
        eligible_keys: count(matched),
        changed_keys: r.changed,
        current_top3: top3(&r.before, detail),
        new_top3: top3(&r.after, detail),
        detail: PreviewDetail::Pattern {
            pattern: pattern.into(),
        },
    }
}

fn quality_run(
    detail: &mut UserDetail,
    scores: &[(InboundId, f64)],
    window_minutes: u32,
    dry_run: bool,
) -> ReorderPreview {
    let score_of = |r: &UserInboundRelation| {
        r.inbound_id
            .and_then(|id| scores.iter().find(|(s, _)| *s == id).map(|(_, v)| *v))
    };
    let current: Vec<RelationId> = current_order(detail).into_iter().map(|(id, ..)| id).collect();
    let mut scored: Vec<(RelationId, f64)> = current
        .iter()
        .filter_map(|id| detail.relation(*id).and_then(|r| score_of(r).map(|s| (*id, s))))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    let order: Vec<RelationId> = scored
        .iter()
        .map(|(id, _)| *id)
        .chain(current.iter().copied().filter(|id| !scored.iter().any(|(s, _)| s == id)))
        .collect();

    let r = if scored.is_empty() {
        replay(detail, &[], true)
    } else {
        replay(detail, &order, dry_run)
    };
    let quality = scored
        .iter()
        .filter_map(|(id, score)| {
            let (_, key, to_priority) = r.after.iter().find(|(a, ..)| a == id)?;
            Some(QualityScore {
                inbound_id: detail.relation(*id).and_then(|rel| rel.inbound_id),
                key: key.clone(),
                score: *score,
                connect_successes: 0,
                limit_rejects: 0,
                reconnects: 0,
                to_priority: *to_priority,
            })
        })
        .collect();

    ReorderPreview {
        user_id: detail.id.clone(),
        total_keys: count(detail.relations.len()),
        eligible_keys: count(scored.len()),
        changed_keys: r.changed,
        current_top3: top3(&r.before, detail),
        new_top3: top3(&r.after, detail),
        detail: PreviewDetail::Quality {
            window_minutes,
            scores: quality,
        },
    }
}

fn summarize(
    results: Vec<(Option<String>, ReorderPreview, Vec<String>, Vec<String>)>,
    pattern_mode: bool,
) -> BulkReorderSummary {
    let target_users = count(results.len());
    let would_update_users = count(results.iter().filter(|(_, p, ..)| p.changed_keys > 0).count());
    let eligible: Vec<u32> = results.iter().map(|(_, p, ..)| p.eligible_keys).collect();
    BulkReorderSummary {
        target_users,
        would_update_users,
        unchanged_users: target_users - would_update_users,
        changed_keys: results.iter().map(|(_, p, ..)| p.changed_keys).sum(),
        matched_users: pattern_mode.then(|| count(eligible.iter().filter(|&&e| e > 0).count())),
        scored_keys: (!pattern_mode).then(|| eligible.iter().sum()),
        preview: results
            .into_iter()
            .filter(|(_, p, ..)| p.changed_keys > 0)
            .take(BULK_PREVIEW_USERS)
            .map(|(username, p, before, after)| BulkUserDiff {
                user_id: p.user_id,
                username,
                changed_keys: p.changed_keys,
                before,
                after,
            })
            .collect(),
    }
}

fn labels(detail: &UserDetail) -> Vec<String> {
    current_order(detail).into_iter().map(|(_, l, _)| l).collect()
}

// ── PanelBackend ────────────────────────────────────────────────────

impl PanelBackend for FakePanel {
    async fn fetch_user(&self, user: &UserId) -> Result<UserDetail, CoreError> {
        let gate = {
            let mut state = self.state();
            let gated = state.fetch_gate.as_ref().is_some_and(|(u, _)| u == user);
            if gated {
                state.fetch_gate.take().map(|(_, notify)| notify)
            } else {
                None
            }
        };
        if let Some(notify) = gate {
            notify.notified().await;
        }
        self.record(format!("fetch_user {user}"), false)?;
        self.state()
            .users
            .get(user)
            .cloned()
            .ok_or_else(|| CoreError::UserNotFound {
                user_id: user.to_string(),
            })
    }

    async fn fetch_devices(
        &self,
        user: &UserId,
        _window_minutes: u32,
    ) -> Result<Vec<DeviceTelemetrySample>, CoreError> {
        self.record(format!("fetch_devices {user}"), false)?;
        Ok(self.state().devices.get(user).cloned().unwrap_or_default())
    }

    async fn fetch_presence(
        &self,
        users: &[UserId],
        _include_offline: bool,
    ) -> Result<Vec<PresenceSnapshot>, CoreError> {
        self.record("fetch_presence".into(), false)?;
        Ok(self
            .state()
            .presence
            .iter()
            .filter(|p| users.contains(&p.user_id))
            .cloned()
            .collect())
    }

    fn open_presence_feed(
        &self,
        _users: &[UserId],
        _include_offline: bool,
        _cancel: CancellationToken,
    ) -> Result<Option<PresenceFeed>, CoreError> {
        Ok(self.state().feed.take())
    }

    async fn set_relation_enabled(
        &self,
        user: &UserId,
        inbound: InboundId,
        enabled: bool,
    ) -> Result<(), CoreError> {
        self.record(format!("enable {user} {inbound} {enabled}"), true)?;
        self.with_detail(user, |d, _| {
            if let Some(r) = d.relations.iter_mut().find(|r| r.inbound_id == Some(inbound)) {
                r.enabled = enabled;
            }
        })
    }

    async fn set_relation_priority(
        &self,
        user: &UserId,
        inbound: InboundId,
        priority: i32,
    ) -> Result<(), CoreError> {
        self.record(format!("priority {user} {inbound} {priority}"), true)?;
        self.with_detail(user, |d, _| {
            if let Some(r) = d.relations.iter_mut().find(|r| r.inbound_id == Some(inbound)) {
                r.priority = priority;
            }
        })
    }

    async fn reorder_relations(
        &self,
        user: &UserId,
        assignments: &[PriorityAssignment],
    ) -> Result<(), CoreError> {
        self.record(format!("reorder {user}"), true)?;
        self.state()
            .batches
            .push((user.clone(), assignments.to_vec()));
        self.with_detail(user, |d, _| {
            for a in assignments {
                if let Some(r) = d
                    .relations
                    .iter_mut()
                    .find(|r| r.inbound_id == Some(a.inbound_id))
                {
                    r.priority = a.priority;
                    r.enabled = a.enabled;
                }
            }
        })
    }

    async fn reorder_by_pattern(
        &self,
        user: &UserId,
        pattern: &str,
        dry_run: bool,
    ) -> Result<ReorderPreview, CoreError> {
        self.record(format!("pattern {user} {pattern} dry={dry_run}"), !dry_run)?;
        self.with_detail(user, |d, _| pattern_run(d, pattern, dry_run))
    }

    async fn reorder_by_quality(
        &self,
        user: &UserId,
        window_minutes: u32,
        dry_run: bool,
    ) -> Result<ReorderPreview, CoreError> {
        self.record(format!("quality {user} {window_minutes} dry={dry_run}"), !dry_run)?;
        self.with_detail(user, |d, state| {
            let scores = state.scores.get(user).cloned().unwrap_or_default();
            quality_run(d, &scores, window_minutes, dry_run)
        })
    }

    async fn bulk_reorder_by_pattern(
        &self,
        users: &[UserId],
        pattern: &str,
        dry_run: bool,
    ) -> Result<BulkReorderSummary, CoreError> {
        self.record(format!("bulk pattern {pattern} dry={dry_run}"), !dry_run)?;
        let mut results = Vec::new();
        for user in users {
            let Ok(entry) = self.with_detail(user, |d, _| {
                let before = labels(d);
                let preview = pattern_run(d, pattern, true);
                let mut after_detail = d.clone();
                pattern_run(&mut after_detail, pattern, false);
                if !dry_run {
                    *d = after_detail.clone();
                }
                (d.username.clone(), preview, before, labels(&after_detail))
            }) else {
                continue;
            };
            results.push(entry);
        }
        Ok(summarize(results, true))
    }

    async fn bulk_reorder_by_quality(
        &self,
        users: &[UserId],
        window_minutes: u32,
        dry_run: bool,
    ) -> Result<BulkReorderSummary, CoreError> {
        self.record(format!("bulk quality {window_minutes} dry={dry_run}"), !dry_run)?;
        let mut results = Vec::new();
        for user in users {
            let Ok(entry) = self.with_detail(user, |d, state| {
                let scores = state.scores.get(user).cloned().unwrap_or_default();
                let before = labels(d);
                let preview = quality_run(d, &scores, window_minutes, true);
                let mut after_detail = d.clone();
                quality_run(&mut after_detail, &scores, window_minutes, false);
                if !dry_run {
                    *d = after_detail.clone();
                }
                (d.username.clone(), preview, before, labels(&after_detail))
            }) else {
                continue;
            };
            results.push(entry);
        }
        Ok(summarize(results, false))
    }

    async fn revoke_device(&self, user: &UserId, fingerprint: &str) -> Result<(), CoreError> {
        self.record(format!("revoke {user} {fingerprint}"), true)?;
        if let Some(samples) = self.state().devices.get_mut(user) {
            samples.retain(|s| s.fingerprint != fingerprint);
        }
        Ok(())
    }
}
