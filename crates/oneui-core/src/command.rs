// ── Command API ──
//
// Single-key writes of a session flow through one `Command` enum. The
// session resolves the key, takes its mutation guard, sends the write
// and refetches.

use crate::model::{InboundId, UserInboundRelation};
use crate::priority::PriorityAssignment;

/// All single-user write operations against the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // ── Key operations ───────────────────────────────────────────────
    ToggleRelation { inbound_id: InboundId, enabled: bool },
    SetPriority { inbound_id: InboundId, priority: i32 },
    /// Full priority batch, applied atomically by the panel.
    BatchReorder { assignments: Vec<PriorityAssignment> },

    // ── Device operations ────────────────────────────────────────────
    RevokeDevice { fingerprint: String },
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ToggleRelation { .. } => "toggle",
            Self::SetPriority { .. } => "set-priority",
            Self::BatchReorder { .. } => "batch-reorder",
            Self::RevokeDevice { .. } => "revoke-device",
        }
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Ok,
    /// The key as refetched after the write.
    Relation(UserInboundRelation),
}
