// ── Bulk reorder ──
//
// Runs a pattern or quality reorder across many users in one panel call.
// The preview shows aggregate counts plus the diff of the first two
// users; users with nothing to reorder count as unchanged, not as errors.

use std::sync::Arc;

use indexmap::IndexSet;
use tracing::info;

use super::pattern::normalize_pattern;
use super::quality::validate_window;
use super::{ReorderKind, ReorderLock};
use crate::backend::PanelBackend;
use crate::error::CoreError;
use crate::model::{BulkReorderSummary, UserId};

/// What to run across the selected users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkStrategy {
    Pattern { pattern: String },
    Quality { window_minutes: u32 },
}

/// A bulk dry run awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkPlan {
    users: Vec<UserId>,
    strategy: BulkStrategy,
    summary: BulkReorderSummary,
}

impl BulkPlan {
    pub fn users(&self) -> &[UserId] {
        &self.users
    }

    pub fn strategy(&self) -> &BulkStrategy {
        &self.strategy
    }

    pub fn summary(&self) -> &BulkReorderSummary {
        &self.summary
    }

    /// Nothing would change for any selected user.
    pub fn is_noop(&self) -> bool {
        self.summary.would_update_users == 0
    }
}

pub struct BulkReorderCoordinator<B> {
    backend: Arc<B>,
    locks: ReorderLock,
}

impl<B: PanelBackend> BulkReorderCoordinator<B> {
    pub fn new(backend: Arc<B>, locks: ReorderLock) -> Self {
        Self { backend, locks }
    }

    /// Dry run across `users` (duplicates removed, first-seen order kept).
    pub async fn preview<I>(&self, users: I, strategy: BulkStrategy) -> Result<BulkPlan, CoreError>
    where
        I: IntoIterator<Item = UserId>,
    {
        let users: Vec<UserId> = users.into_iter().collect::<IndexSet<_>>().into_iter().collect();
        if users.is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "no users selected".into(),
            });
        }
        let strategy = normalize_strategy(strategy)?;
        let summary = self.run(&users, &strategy, true).await?;
        Ok(BulkPlan {
            users,
            strategy,
            summary,
        })
    }

    /// Real write for the users and strategy of a previous dry run.
    pub async fn apply(&self, plan: &BulkPlan) -> Result<BulkReorderSummary, CoreError> {
        let summary = self.run(&plan.users, &plan.strategy, false).await?;
        info!(
            users = summary.target_users,
            updated = summary.would_update_users,
            changed = summary.changed_keys,
            "bulk reorder applied"
        );
        Ok(summary)
    }

    async fn run(
        &self,
        users: &[UserId],
        strategy: &BulkStrategy,
        dry_run: bool,
    ) -> Result<BulkReorderSummary, CoreError> {
        let _leases = self.locks.try_acquire_all(users, ReorderKind::Bulk)?;
        match strategy {
            BulkStrategy::Pattern { pattern } => {
                self.backend
                    .bulk_reorder_by_pattern(users, pattern, dry_run)
                    .await
            }
            BulkStrategy::Quality { window_minutes } => {
                self.backend
                    .bulk_reorder_by_quality(users, *window_minutes, dry_run)
                    .await
            }
        }
    }
}

fn normalize_strategy(strategy: BulkStrategy) -> Result<BulkStrategy, CoreError> {
    Ok(match strategy {
        BulkStrategy::Pattern { pattern } => BulkStrategy::Pattern {
            pattern: normalize_pattern(&pattern)?,
        },
        BulkStrategy::Quality { window_minutes } => BulkStrategy::Quality {
            window_minutes: validate_window(window_minutes)?,
        },
    })
}
