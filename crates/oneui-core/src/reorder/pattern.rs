// ── Pattern reorder ──
//
// Promotes keys whose inbound profile is on a named allow-list ahead of
// the rest. Matching and the new order are computed by the panel; the
// policy here mirrors the panel's list so keys can be marked locally.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{PendingReorder, ReorderKind, ReorderLock};
use crate::backend::PanelBackend;
use crate::error::CoreError;
use crate::model::{
    InboundMeta, PreviewDetail, RelationId, ReorderOutcome, UserId, UserInboundRelation,
};

/// Name of the built-in policy.
pub const MYANMAR_PATTERN: &str = "myanmar";

// ── Policy ──────────────────────────────────────────────────────────

/// One allowed inbound profile. Absent fields match anything; present
/// fields compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
}

impl ProfileRule {
    pub fn matches(&self, inbound: &InboundMeta) -> bool {
        field_matches(self.protocol.as_deref(), Some(&inbound.protocol))
            && field_matches(self.network.as_deref(), inbound.network.as_deref())
            && field_matches(self.security.as_deref(), inbound.security.as_deref())
    }
}

fn field_matches(want: Option<&str>, have: Option<&str>) -> bool {
    want.is_none_or(|w| have.is_some_and(|h| h.eq_ignore_ascii_case(w)))
}

/// A named allow-list of inbound profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternPolicy {
    pub name: String,
    #[serde(default)]
    pub profiles: Vec<ProfileRule>,
}

impl PatternPolicy {
    /// REALITY on any protocol, VLESS over WS+TLS, Trojan over WS+TLS.
    pub fn myanmar() -> Self {
        let rule = |protocol: Option<&str>, network: Option<&str>, security: &str| ProfileRule {
            protocol: protocol.map(Into::into),
            network: network.map(Into::into),
            security: Some(security.into()),
        };
        Self {
            name: MYANMAR_PATTERN.into(),
            profiles: vec![
                rule(None, None, "reality"),
                rule(Some("vless"), Some("ws"), "tls"),
                rule(Some("trojan"), Some("ws"), "tls"),
            ],
        }
    }

    pub fn matches(&self, inbound: &InboundMeta) -> bool {
        self.profiles.iter().any(|rule| rule.matches(inbound))
    }

    pub fn matches_relation(&self, relation: &UserInboundRelation) -> bool {
        relation.inbound.as_ref().is_some_and(|i| self.matches(i))
    }

    /// Current priority order with matching keys moved to the front.
    /// Relative order inside each group is kept.
    pub fn arrange(&self, relations: &[UserInboundRelation]) -> Vec<RelationId> {
        let mut ordered: Vec<(usize, &UserInboundRelation)> = relations.iter().enumerate().collect();
        ordered.sort_by_key(|(index, r)| (r.priority, *index));
        let (matching, rest): (Vec<_>, Vec<_>) = ordered
            .into_iter()
            .map(|(_, r)| r)
            .partition(|r| self.matches_relation(r));
        matching.into_iter().chain(rest).map(|r| r.id).collect()
    }
}

// ── Workflow ────────────────────────────────────────────────────────

pub struct PatternReorderWorkflow<B> {
    backend: Arc<B>,
    locks: ReorderLock,
}

impl<B: PanelBackend> PatternReorderWorkflow<B> {
    pub fn new(backend: Arc<B>, locks: ReorderLock) -> Self {
        Self { backend, locks }
    }

    /// Dry run. Refused when the user has no keys or none match.
    pub async fn preview(&self, user: &UserId, pattern: &str) -> Result<PendingReorder, CoreError> {
        let pattern = normalize_pattern(pattern)?;
        let _lease = self.locks.try_acquire(user, ReorderKind::Pattern)?;

        let preview = self.backend.reorder_by_pattern(user, &pattern, true).await?;
        if preview.total_keys == 0 {
            return Err(CoreError::NoEligibleKeys {
                user_id: user.to_string(),
            });
        }
        if preview.eligible_keys == 0 {
            return Err(CoreError::NoPatternMatch {
                user_id: user.to_string(),
                pattern,
            });
        }
        Ok(PendingReorder::new(preview))
    }

    /// Real write. The panel recomputes the order; the preview is not replayed.
    pub async fn apply(&self, pending: &PendingReorder) -> Result<ReorderOutcome, CoreError> {
        let PreviewDetail::Pattern { pattern } = &pending.preview().detail else {
            return Err(CoreError::ValidationFailed {
                message: "not a pattern reorder preview".into(),
            });
        };
        let user = pending.user_id();
        let _lease = self.locks.try_acquire(user, ReorderKind::Pattern)?;

        let result = self.backend.reorder_by_pattern(user, pattern, false).await?;
        if result.eligible_keys == 0 {
            return Err(CoreError::NoPatternMatch {
                user_id: user.to_string(),
                pattern: pattern.clone(),
            });
        }
        info!(
            user = %user,
            pattern,
            changed = result.changed_keys,
            "pattern reorder applied"
        );
        Ok(ReorderOutcome {
            total_keys: result.total_keys,
            eligible_keys: result.eligible_keys,
            changed_keys: result.changed_keys,
        })
    }
}

pub(crate) fn normalize_pattern(pattern: &str) -> Result<String, CoreError> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(CoreError::ValidationFailed {
            message: "pattern name must not be empty".into(),
        });
    }
    Ok(pattern.to_lowercase())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::InboundId;
    use crate::testing::{FakePanel, relation, user_with};

    fn meta(protocol: &str, network: Option<&str>, security: Option<&str>) -> InboundMeta {
        InboundMeta {
            id: InboundId::new(1).unwrap(),
            protocol: protocol.into(),
            network: network.map(Into::into),
            security: security.map(Into::into),
            port: 443,
            tag: None,
            remark: None,
        }
    }

    #[test]
    fn myanmar_policy_profiles() {
        let p = PatternPolicy::myanmar();
        assert!(p.matches(&meta("vless", Some("tcp"), Some("REALITY"))));
        assert!(p.matches(&meta("VLESS", Some("ws"), Some("tls"))));
        assert!(p.matches(&meta("trojan", Some("ws"), Some("tls"))));
        assert!(!p.matches(&meta("vmess", Some("ws"), Some("tls"))));
        assert!(!p.matches(&meta("trojan", Some("grpc"), Some("tls"))));
        assert!(!p.matches(&meta("vless", Some("ws"), None)));
    }

    #[test]
    fn arrange_promotes_matches_stably() {
        let relations = vec![
            relation(1, 10, 100, "vmess", "tcp", "none"),
            relation(2, 20, 101, "vless", "ws", "tls"),
            relation(3, 30, 102, "shadowsocks", "tcp", "none"),
            relation(4, 40, 103, "trojan", "ws", "tls"),
        ];
        let order = PatternPolicy::myanmar().arrange(&relations);
        assert_eq!(order, [2, 4, 1, 3].map(RelationId::new).to_vec());
    }

    #[tokio::test]
    async fn second_dry_run_after_apply_changes_nothing() {
        let user = UserId::from("7");
        let panel = Arc::new(FakePanel::default().with_user(user_with(
            "7",
            vec![
                relation(1, 10, 100, "vmess", "tcp", "none"),
                relation(2, 20, 101, "vless", "tcp", "reality"),
            ],
        )));
        let workflow = PatternReorderWorkflow::new(Arc::clone(&panel), ReorderLock::new());

        let pending = workflow.preview(&user, "Myanmar").await.unwrap();
        assert_eq!(pending.preview().eligible_keys, 1);
        assert_eq!(pending.preview().changed_keys, 2);

        let outcome = workflow.apply(&pending).await.unwrap();
        assert_eq!(outcome.changed_keys, 2);

        let again = workflow.preview(&user, "myanmar").await.unwrap();
        assert!(again.preview().is_noop());
    }

    #[tokio::test]
    async fn no_match_is_refused() {
        let user = UserId::from("7");
        let panel = Arc::new(FakePanel::default().with_user(user_with(
            "7",
            vec![relation(1, 10, 100, "vmess", "tcp", "none")],
        )));
        let workflow = PatternReorderWorkflow::new(Arc::clone(&panel), ReorderLock::new());

        let err = workflow.preview(&user, "myanmar").await.unwrap_err();
        assert!(matches!(err, CoreError::NoPatternMatch { .. }));
        assert!(panel.writes().is_empty());
    }

    #[tokio::test]
    async fn busy_user_is_refused_before_any_request() {
        let user = UserId::from("7");
        let panel = Arc::new(FakePanel::default().with_user(user_with(
            "7",
            vec![relation(1, 10, 100, "vless", "ws", "tls")],
        )));
        let locks = ReorderLock::new();
        let workflow = PatternReorderWorkflow::new(Arc::clone(&panel), locks.clone());

        let _held = locks.try_acquire(&user, ReorderKind::Drag).unwrap();
        let err = workflow.preview(&user, "myanmar").await.unwrap_err();

        assert!(matches!(err, CoreError::ReorderInFlight { .. }));
        assert!(panel.calls().is_empty());
    }

    #[test]
    fn blank_pattern_is_invalid() {
        assert!(normalize_pattern("  ").is_err());
        assert_eq!(normalize_pattern(" Myanmar ").unwrap(), "myanmar");
    }
}
