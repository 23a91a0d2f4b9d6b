//! Access-key presence and priority engine between `oneui-api` and UI
//! consumers (the `oneui` CLI).
//!
//! - **[`KeySession`]**: runtime facade for one user. Fetches relations and
//!   device telemetry, keeps presence current (live stream with polling
//!   fallback), and runs every write under per-key guards and a per-user
//!   reorder lock. Switching user discards results still in flight.
//!
//! - **[`DataStore`]**: latest relations, telemetry and presence of the
//!   tracked user in `watch` channels. Every input change re-runs
//!   [`PresenceFusion`] and row projection from scratch; consumers subscribe
//!   through [`RowStream`].
//!
//! - **Reordering**: [`DragReorderController`] turns a drag gesture into a
//!   full priority batch; [`PatternReorderWorkflow`] and
//!   [`QualityReorderWorkflow`] ask the panel for a dry run and only write
//!   after confirmation; [`BulkReorderCoordinator`] does the same across
//!   many users.
//!
//! - **[`PanelBackend`]**: the seam to the panel, implemented by
//!   [`oneui_api::PanelClient`].

pub mod backend;
pub mod command;
pub mod config;
pub mod convert;
pub mod drag;
pub mod error;
pub mod model;
pub mod presence;
pub mod presence_channel;
pub mod priority;
pub mod projection;
pub mod reorder;
pub mod session;
pub mod store;
pub mod stream;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::{PanelBackend, connect};
pub use command::{Command, CommandResult};
pub use config::{PanelConfig, PollInterval, PresenceConfig, SessionConfig, TlsVerification};
pub use drag::{DragReorderController, DragState, DropPlan};
pub use error::CoreError;
pub use presence::{InboundPresenceAggregate, PresenceFusion, RelationPresence};
pub use presence_channel::{ChannelStatus, PresenceChannel, PresenceSource};
pub use priority::{PriorityAssignment, assign_priorities};
pub use projection::{KeyFilter, SortDirection, SortField, ViewSpec, project_rows};
pub use reorder::{
    BulkPlan, BulkReorderCoordinator, BulkStrategy, PatternPolicy, PatternReorderWorkflow,
    PendingReorder, ProfileRule, QualityReorderWorkflow, ReorderKind, ReorderLock,
};
pub use session::KeySession;
pub use store::{DataStore, Freshness, MutationGuards, MutationState};
pub use stream::RowStream;

pub use oneui_api::PanelClient;

pub use model::{
    AccessKeyRow, BulkReorderSummary, BulkUserDiff, DeviceTelemetrySample, InboundId, InboundMeta,
    KeyOrder, PresenceSnapshot, PreviewDetail, QualityScore, RelationId, ReorderOutcome,
    ReorderPreview, UserDetail, UserId, UserInboundRelation,
};
