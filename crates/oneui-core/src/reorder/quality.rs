// ── Quality reorder ──
//
// Ranks keys by recent connection outcomes. Scoring weights live on the
// panel; the client only chooses the look-back window.

use std::sync::Arc;

use tracing::info;

use super::{PendingReorder, ReorderKind, ReorderLock};
use crate::backend::PanelBackend;
use crate::config::MAX_WINDOW_MINUTES;
use crate::error::CoreError;
use crate::model::{PreviewDetail, ReorderOutcome, UserId};

pub struct QualityReorderWorkflow<B> {
    backend: Arc<B>,
    locks: ReorderLock,
}

impl<B: PanelBackend> QualityReorderWorkflow<B> {
    pub fn new(backend: Arc<B>, locks: ReorderLock) -> Self {
        Self { backend, locks }
    }

    /// Dry run. Refused when no key saw activity inside the window.
    pub async fn preview(
        &self,
        user: &UserId,
        window_minutes: u32,
    ) -> Result<PendingReorder, CoreError> {
        let window_minutes = validate_window(window_minutes)?;
        let _lease = self.locks.try_acquire(user, ReorderKind::Quality)?;

        let preview = self
            .backend
            .reorder_by_quality(user, window_minutes, true)
            .await?;
        if preview.total_keys == 0 {
            return Err(CoreError::NoEligibleKeys {
                user_id: user.to_string(),
            });
        }
        if preview.eligible_keys == 0 {
            return Err(CoreError::NoRecentActivity {
                user_id: user.to_string(),
                window_minutes,
            });
        }
        Ok(PendingReorder::new(preview))
    }

    /// Real write with the window the preview was made with.
    pub async fn apply(&self, pending: &PendingReorder) -> Result<ReorderOutcome, CoreError> {
        let PreviewDetail::Quality { window_minutes, .. } = pending.preview().detail else {
            return Err(CoreError::ValidationFailed {
                message: "not a quality reorder preview".into(),
            });
        };
        let user = pending.user_id();
        let _lease = self.locks.try_acquire(user, ReorderKind::Quality)?;

        let result = self
            .backend
            .reorder_by_quality(user, window_minutes, false)
            .await?;
        if result.eligible_keys == 0 {
            return Err(CoreError::NoRecentActivity {
                user_id: user.to_string(),
                window_minutes,
            });
        }
        info!(
            user = %user,
            window_minutes,
            changed = result.changed_keys,
            "quality reorder applied"
        );
        Ok(ReorderOutcome {
            total_keys: result.total_keys,
            eligible_keys: result.eligible_keys,
            changed_keys: result.changed_keys,
        })
    }
}

pub(crate) fn validate_window(window_minutes: u32) -> Result<u32, CoreError> {
    if (1..=MAX_WINDOW_MINUTES).contains(&window_minutes) {
        Ok(window_minutes)
    } else {
        Err(CoreError::ValidationFailed {
            message: format!(
                "window of {window_minutes} minutes out of range (1..={MAX_WINDOW_MINUTES})"
            ),
        })
    }
}
