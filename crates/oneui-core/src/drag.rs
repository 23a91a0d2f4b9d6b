// ── Drag reorder state machine ──
//
// idle → dragging(source) → [drop on target] → applying → idle
//
// A drop turns the current view into a full priority batch. The
// controller never talks to the panel itself; the session submits the
// plan and calls `finish()` whatever the outcome.

use crate::error::CoreError;
use crate::model::{AccessKeyRow, RelationId};
use crate::priority::{PriorityAssignment, assign_priorities, move_item};
use crate::projection::ViewSpec;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        source: RelationId,
        /// Row currently highlighted as drop target.
        over: Option<RelationId>,
    },
    Applying {
        source: RelationId,
    },
}

/// A batch ready to submit after a successful drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropPlan {
    /// New relation order (valid-inbound rows only).
    pub order: Vec<RelationId>,
    pub assignments: Vec<PriorityAssignment>,
}

#[derive(Debug, Default)]
pub struct DragReorderController {
    state: DragState,
}

impl DragReorderController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_applying(&self) -> bool {
        matches!(self.state, DragState::Applying { .. })
    }

    /// Start dragging `source`. Refused, with no state change, unless the
    /// view shows every key in ascending priority order.
    pub fn begin(&mut self, source: RelationId, view: &ViewSpec) -> Result<(), CoreError> {
        if self.is_applying() {
            return Err(CoreError::GateClosed {
                reason: "the previous drop is still being applied".into(),
            });
        }
        if let Some(reason) = view.drag_blocker() {
            return Err(CoreError::GateClosed { reason });
        }
        self.state = DragState::Dragging { source, over: None };
        Ok(())
    }

    /// Update the highlighted drop target. Ignored when not dragging.
    pub fn hover(&mut self, target: Option<RelationId>) {
        if let DragState::Dragging { over, .. } = &mut self.state {
            *over = target;
        }
    }

    /// Abandon the drag without changes.
    pub fn cancel(&mut self) {
        if !self.is_applying() {
            self.state = DragState::Idle;
        }
    }

    /// Drop the dragged key onto `target`.
    ///
    /// `rows` must be the current filtered and sorted view. On success the
    /// controller enters `Applying` and returns the batch; on any refusal it
    /// returns to `Idle`.
    pub fn drop_on(
        &mut self,
        target: RelationId,
        rows: &[AccessKeyRow],
        view: &ViewSpec,
        base: i32,
    ) -> Result<DropPlan, CoreError> {
        let DragState::Dragging { source, .. } = self.state else {
            return Err(CoreError::NotDragging);
        };

        match plan_drop(source, target, rows, view, base) {
            Ok(plan) => {
                self.state = DragState::Applying { source };
                Ok(plan)
            }
            Err(e) => {
                self.state = DragState::Idle;
                Err(e)
            }
        }
    }

    /// Leave `Applying` (or any other state) and clear highlights.
    pub fn finish(&mut self) {
        self.state = DragState::Idle;
    }
}

fn plan_drop(
    source: RelationId,
    target: RelationId,
    rows: &[AccessKeyRow],
    view: &ViewSpec,
    base: i32,
) -> Result<DropPlan, CoreError> {
    if let Some(reason) = view.drag_blocker() {
        return Err(CoreError::GateClosed { reason });
    }
    if source == target {
        return Err(CoreError::SameTarget);
    }

    let mut eligible: Vec<&AccessKeyRow> = rows.iter().filter(|r| r.inbound_id.is_some()).collect();
    let position = |id: RelationId| {
        eligible
            .iter()
            .position(|r| r.relation_id == id)
            .ok_or_else(|| CoreError::UnknownKey {
                identifier: id.to_string(),
            })
    };
    let from = position(source)?;
    let to = position(target)?;
    move_item(&mut eligible, from, to);

    let ordered: Vec<_> = eligible
        .iter()
        .filter_map(|r| r.inbound_id.map(|id| (id, r.enabled)))
        .collect();
    let assignments = assign_priorities(&ordered, base)?;

    Ok(DropPlan {
        order: eligible.iter().map(|r| r.relation_id).collect(),
        assignments,
    })
}
