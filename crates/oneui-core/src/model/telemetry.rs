// ── Device telemetry and coarse presence ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{InboundId, UserId};

/// One device observed using one of a user's keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTelemetrySample {
    pub fingerprint: String,
    pub inbound_id: Option<InboundId>,
    pub online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub client_ip: Option<String>,
}

/// Per-user presence signal. Does not say which key is in use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub user_id: UserId,
    pub online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}
