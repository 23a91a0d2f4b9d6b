// ── API-to-domain type conversions ──
//
// Bridges raw `oneui_api` wire types into canonical `oneui_core::model`
// types. Non-positive inbound ids become `None`; everything else is a
// straight field mapping.

use oneui_api::types::{
    BulkReorderResponse, BulkUserPreviewResponse, DeviceSampleResponse, InboundResponse,
    KeyOrderEntry, PatternReorderResponse, PresenceResponse, QualityReorderResponse,
    QualityScoreResponse, UserInboundResponse, UserResponse,
};

use crate::model::{
    BulkReorderSummary, BulkUserDiff, DeviceTelemetrySample, InboundId, InboundMeta, KeyOrder,
    PreviewDetail, PresenceSnapshot, QualityScore, RelationId, ReorderPreview, UserDetail, UserId,
    UserInboundRelation,
};

/// Number of users a bulk preview shows.
pub(crate) const BULK_PREVIEW_USERS: usize = 2;

// ── Users ───────────────────────────────────────────────────────────

impl From<UserResponse> for UserDetail {
    fn from(u: UserResponse) -> Self {
        Self {
            id: UserId::from(u.id),
            username: u.username,
            email: u.email,
            expires_at: u.expire_date,
            relations: u.inbounds.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<UserInboundResponse> for UserInboundRelation {
    fn from(r: UserInboundResponse) -> Self {
        let inbound = r.inbound.and_then(inbound_meta);
        Self {
            id: RelationId::new(r.id),
            inbound_id: r
                .inbound_id
                .and_then(InboundId::new)
                .or_else(|| inbound.as_ref().map(|i| i.id)),
            enabled: r.enabled,
            priority: r.priority,
            inbound,
        }
    }
}

fn inbound_meta(i: InboundResponse) -> Option<InboundMeta> {
    Some(InboundMeta {
        id: InboundId::new(i.id)?,
        protocol: i.protocol,
        network: i.network,
        security: i.security,
        port: i.port,
        tag: i.tag,
        remark: i.remark,
    })
}

// ── Telemetry & presence ────────────────────────────────────────────

impl From<DeviceSampleResponse> for DeviceTelemetrySample {
    fn from(d: DeviceSampleResponse) -> Self {
        Self {
            fingerprint: d.fingerprint,
            inbound_id: d.inbound_id.and_then(InboundId::new),
            online: d.online,
            last_seen_at: d.last_seen_at,
            client_ip: d.client_ip,
        }
    }
}

impl From<PresenceResponse> for PresenceSnapshot {
    fn from(p: PresenceResponse) -> Self {
        Self {
            user_id: UserId::from(p.user_id),
            online: p.online,
            last_seen_at: p.last_seen_at,
        }
    }
}

// ── Reorder results ─────────────────────────────────────────────────

impl From<KeyOrderEntry> for KeyOrder {
    fn from(e: KeyOrderEntry) -> Self {
        Self {
            inbound_id: e.inbound_id.and_then(InboundId::new),
            key: e.key,
            priority: e.priority,
        }
    }
}

impl From<QualityScoreResponse> for QualityScore {
    fn from(s: QualityScoreResponse) -> Self {
        Self {
            inbound_id: s.inbound_id.and_then(InboundId::new),
            key: s.key,
            score: s.score,
            connect_successes: s.connect_successes,
            limit_rejects: s.limit_rejects,
            reconnects: s.reconnects,
            to_priority: s.to_priority,
        }
    }
}

pub(crate) fn pattern_preview(
    user: &UserId,
    pattern: &str,
    r: PatternReorderResponse,
) -> ReorderPreview {
    ReorderPreview {
        user_id: user.clone(),
        total_keys: r.total_keys,
        eligible_keys: r.matched_keys,
        changed_keys: r.changed_keys,
        current_top3: r.current_top3.into_iter().map(Into::into).collect(),
        new_top3: r.new_top3.into_iter().map(Into::into).collect(),
        detail: PreviewDetail::Pattern {
            pattern: pattern.to_owned(),
        },
    }
}

/// The preview keeps the window the caller asked for, so the apply
/// resubmits exactly that window whatever the panel echoes back.
pub(crate) fn quality_preview(
    user: &UserId,
    requested_window: u32,
    r: QualityReorderResponse,
) -> ReorderPreview {
    ReorderPreview {
        user_id: user.clone(),
        total_keys: r.total_keys,
        eligible_keys: r.scored_keys,
        changed_keys: r.changed_keys,
        current_top3: r.current_top3.into_iter().map(Into::into).collect(),
        new_top3: r.new_top3.into_iter().map(Into::into).collect(),
        detail: PreviewDetail::Quality {
            window_minutes: requested_window,
            scores: r.scores.into_iter().map(Into::into).collect(),
        },
    }
}

impl From<BulkUserPreviewResponse> for BulkUserDiff {
    fn from(p: BulkUserPreviewResponse) -> Self {
        Self {
            user_id: UserId::from(p.user_id),
            username: p.username,
            changed_keys: p.changed_keys,
            before: p.before,
            after: p.after,
        }
    }
}

impl From<BulkReorderResponse> for BulkReorderSummary {
    fn from(r: BulkReorderResponse) -> Self {
        Self {
            target_users: r.target_users,
            would_update_users: r.would_update_users,
            unchanged_users: r.unchanged_users,
            changed_keys: r.changed_keys,
            matched_users: r.matched_users,
            scored_keys: r.scored_keys,
            preview: r
                .preview
                .into_iter()
                .take(BULK_PREVIEW_USERS)
                .map(Into::into)
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn wire_relation(inbound_id: Option<i64>, inbound: Option<i64>) -> UserInboundResponse {
        UserInboundResponse {
            id: 1,
            inbound_id,
            enabled: true,
            priority: 100,
            inbound: inbound.map(|id| InboundResponse {
                id,
                tag: None,
                remark: None,
                protocol: "trojan".into(),
                port: 443,
                network: Some("ws".into()),
                security: Some("tls".into()),
            }),
        }
    }

    #[test]
    fn non_positive_inbound_id_is_dropped() {
        let rel = UserInboundRelation::from(wire_relation(Some(0), None));
        assert!(rel.inbound_id.is_none());
        assert!(rel.inbound.is_none());
    }

    #[test]
    fn inbound_id_falls_back_to_nested_inbound() {
        let rel = UserInboundRelation::from(wire_relation(None, Some(12)));
        assert_eq!(rel.inbound_id.unwrap().get(), 12);
        assert_eq!(rel.label(), "trojan:443");
    }

    #[test]
    fn quality_preview_keeps_requested_window() {
        let response = QualityReorderResponse {
            total_keys: 2,
            scored_keys: 1,
            changed_keys: 2,
            window_minutes: Some(1440),
            current_top3: vec![],
            new_top3: vec![],
            scores: vec![],
        };
        let preview = quality_preview(&"42".into(), 30, response);
        let PreviewDetail::Quality { window_minutes, .. } = preview.detail else {
            panic!("expected quality detail");
        };
        assert_eq!(window_minutes, 30);
    }

    #[test]
    fn bulk_preview_is_capped() {
        let diff = |id: &str| BulkUserPreviewResponse {
            user_id: id.into(),
            username: None,
            changed_keys: 1,
            before: vec![],
            after: vec![],
        };
        let summary = BulkReorderSummary::from(BulkReorderResponse {
            target_users: 3,
            would_update_users: 3,
            unchanged_users: 0,
            changed_keys: 3,
            matched_users: Some(3),
            scored_keys: None,
            preview: vec![diff("1"), diff("2"), diff("3")],
        });
        assert_eq!(summary.preview.len(), 2);
        assert_eq!(summary.preview[1].user_id.as_str(), "2");
    }
}
