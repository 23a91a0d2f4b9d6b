// Wire types for the One-UI panel API.
//
// Field names follow the panel's camelCase JSON. Everything optional on
// the wire is `Option` or `#[serde(default)]` here; domain defaults are
// applied in `oneui-core`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Envelope ─────────────────────────────────────────────────────────

/// Every REST response is wrapped as `{ success, message?, data? }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}

fn default_true() -> bool {
    true
}

// ── Users & relations ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// `None` means unlimited.
    #[serde(default)]
    pub expire_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub inbounds: Vec<UserInboundResponse>,
}

/// One user-to-inbound edge ("access key").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInboundResponse {
    pub id: i64,
    #[serde(default)]
    pub inbound_id: Option<i64>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub inbound: Option<InboundResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundResponse {
    pub id: i64,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub security: Option<String>,
}

// ── Telemetry & presence ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSampleResponse {
    pub fingerprint: String,
    #[serde(default)]
    pub inbound_id: Option<i64>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub user_id: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

// ── Mutations ────────────────────────────────────────────────────────

/// Partial update of a single relation. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityAssignmentBody {
    pub inbound_id: i64,
    pub priority: i32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderBatchBody {
    pub assignments: Vec<PriorityAssignmentBody>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternReorderBody {
    pub pattern: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReorderBody {
    pub window_minutes: u32,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPatternBody {
    pub user_ids: Vec<String>,
    pub pattern: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkQualityBody {
    pub user_ids: Vec<String>,
    pub window_minutes: u32,
    pub dry_run: bool,
}

// ── Reorder results ──────────────────────────────────────────────────

/// One entry of a "top N" ordering shown in previews.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyOrderEntry {
    #[serde(default)]
    pub inbound_id: Option<i64>,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternReorderResponse {
    #[serde(default)]
    pub total_keys: u32,
    #[serde(default)]
    pub matched_keys: u32,
    #[serde(default)]
    pub changed_keys: u32,
    #[serde(default)]
    pub current_top3: Vec<KeyOrderEntry>,
    #[serde(default)]
    pub new_top3: Vec<KeyOrderEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityScoreResponse {
    #[serde(default)]
    pub inbound_id: Option<i64>,
    pub key: String,
    pub score: f64,
    #[serde(default)]
    pub connect_successes: u32,
    #[serde(default)]
    pub limit_rejects: u32,
    #[serde(default)]
    pub reconnects: u32,
    #[serde(default)]
    pub to_priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReorderResponse {
    #[serde(default)]
    pub total_keys: u32,
    #[serde(default)]
    pub scored_keys: u32,
    #[serde(default)]
    pub changed_keys: u32,
    #[serde(default)]
    pub window_minutes: Option<u32>,
    #[serde(default)]
    pub current_top3: Vec<KeyOrderEntry>,
    #[serde(default)]
    pub new_top3: Vec<KeyOrderEntry>,
    #[serde(default)]
    pub scores: Vec<QualityScoreResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUserPreviewResponse {
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub changed_keys: u32,
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReorderResponse {
    #[serde(default)]
    pub target_users: u32,
    #[serde(default, alias = "updatedUsers")]
    pub would_update_users: u32,
    #[serde(default)]
    pub unchanged_users: u32,
    #[serde(default)]
    pub changed_keys: u32,
    #[serde(default)]
    pub matched_users: Option<u32>,
    #[serde(default)]
    pub scored_keys: Option<u32>,
    #[serde(default)]
    pub preview: Vec<BulkUserPreviewResponse>,
}
