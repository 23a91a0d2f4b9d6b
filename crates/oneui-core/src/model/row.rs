// ── Access key row (derived view model) ──

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ids::{InboundId, RelationId};

/// One projected row of the access-key table.
///
/// Rebuilt from scratch whenever relations, telemetry, or presence change.
/// `index` is the relation's position in the fetched order and is the final
/// tie-breaker when sorting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyRow {
    pub index: usize,
    pub relation_id: RelationId,
    pub inbound_id: Option<InboundId>,
    pub label: String,
    pub protocol: String,
    pub network: Option<String>,
    pub security: Option<String>,
    pub port: u16,
    pub priority: i32,
    pub enabled: bool,
    pub online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub online_devices: u32,
    pub seen_devices: u32,
    /// Shared across all rows of a user. `None` means unlimited.
    pub expiration_days: Option<i64>,
}
