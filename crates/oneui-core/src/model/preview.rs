// ── Reorder previews and outcomes ──
//
// Dry-run results returned by the panel for server-side reorders. A
// preview is only ever rendered; the real write asks the panel to
// recompute from scratch.

use serde::Serialize;

use super::ids::{InboundId, UserId};

/// One entry of a "top 3" ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyOrder {
    pub inbound_id: Option<InboundId>,
    pub key: String,
    pub priority: i32,
}

/// Per-key quality breakdown from a quality dry run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityScore {
    pub inbound_id: Option<InboundId>,
    pub key: String,
    pub score: f64,
    pub connect_successes: u32,
    pub limit_rejects: u32,
    pub reconnects: u32,
    pub to_priority: i32,
}

/// Strategy-specific part of a preview.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum PreviewDetail {
    Pattern {
        pattern: String,
    },
    Quality {
        window_minutes: u32,
        scores: Vec<QualityScore>,
    },
}

/// Dry-run result for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderPreview {
    pub user_id: UserId,
    pub total_keys: u32,
    /// Keys matching the pattern, or keys with a quality score.
    pub eligible_keys: u32,
    pub changed_keys: u32,
    pub current_top3: Vec<KeyOrder>,
    pub new_top3: Vec<KeyOrder>,
    pub detail: PreviewDetail,
}

impl ReorderPreview {
    /// A preview with zero changed keys means the order is already optimal.
    pub fn is_noop(&self) -> bool {
        self.changed_keys == 0
    }
}

/// Result of a confirmed (non-dry-run) reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderOutcome {
    pub total_keys: u32,
    pub eligible_keys: u32,
    pub changed_keys: u32,
}

// ── Bulk ────────────────────────────────────────────────────────────

/// Before/after key ordering of one user in a bulk preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUserDiff {
    pub user_id: UserId,
    pub username: Option<String>,
    pub changed_keys: u32,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// Aggregate result of a bulk reorder (dry run or applied).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReorderSummary {
    pub target_users: u32,
    pub would_update_users: u32,
    pub unchanged_users: u32,
    pub changed_keys: u32,
    /// Pattern mode only.
    pub matched_users: Option<u32>,
    /// Quality mode only.
    pub scored_keys: Option<u32>,
    /// At most the first two users.
    pub preview: Vec<BulkUserDiff>,
}
