// ── Priority assignment ──
//
// Turns an ordered list of keys into contiguous priorities. Lower value
// means tried first.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::CoreError;
use crate::model::InboundId;

/// First priority handed out when rebuilding an order.
pub const DEFAULT_PRIORITY_BASE: i32 = 100;

/// Smallest priority the panel accepts.
pub const MIN_PRIORITY: i32 = 1;

/// Largest priority the panel accepts.
pub const MAX_PRIORITY: i32 = 9999;

/// New priority of one key in a batch reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityAssignment {
    pub inbound_id: InboundId,
    pub priority: i32,
    pub enabled: bool,
}

impl From<PriorityAssignment> for oneui_api::types::PriorityAssignmentBody {
    fn from(a: PriorityAssignment) -> Self {
        Self {
            inbound_id: a.inbound_id.get(),
            priority: a.priority,
            enabled: a.enabled,
        }
    }
}

/// Check a single priority value against the panel's accepted range.
pub fn validate_priority(priority: i32) -> Result<i32, CoreError> {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        Ok(priority)
    } else {
        Err(CoreError::ValidationFailed {
            message: format!(
                "priority {priority} out of range ({MIN_PRIORITY}..={MAX_PRIORITY})"
            ),
        })
    }
}

/// Assign `base, base+1, …` to keys in the given order.
///
/// Each entry is `(inbound, enabled)`; the enabled flag is carried through
/// unchanged. Duplicate inbounds and results outside the panel's range are
/// rejected.
pub fn assign_priorities(
    ordered: &[(InboundId, bool)],
    base: i32,
) -> Result<Vec<PriorityAssignment>, CoreError> {
    let mut seen = HashSet::with_capacity(ordered.len());
    if let Some((dup, _)) = ordered.iter().find(|(id, _)| !seen.insert(*id)) {
        return Err(CoreError::ValidationFailed {
            message: format!("inbound {dup} appears twice in the new order"),
        });
    }

    let mut out = Vec::with_capacity(ordered.len());
    let mut priority = validate_priority(base)?;
    for (i, &(inbound_id, enabled)) in ordered.iter().enumerate() {
        if i > 0 {
            priority = priority
                .checked_add(1)
                .ok_or_else(|| CoreError::ValidationFailed {
                    message: "priority overflow".into(),
                })
                .and_then(validate_priority)?;
        }
        out.push(PriorityAssignment {
            inbound_id,
            priority,
            enabled,
        });
    }
    Ok(out)
}

/// Remove the item at `from` and reinsert it at `to`.
///
/// Out-of-range indices leave the list untouched and return `false`.
pub fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from >= items.len() || to >= items.len() {
        return false;
    }
    let item = items.remove(from);
    items.insert(to, item);
    true
}
