// ── Domain model ──
//
// Canonical representations of users, access keys, telemetry, and
// reorder previews. Built from the wire types in `oneui-api` by
// `crate::convert`; consumers (the CLI) only ever see these.

pub mod ids;
pub mod preview;
pub mod relation;
pub mod row;
pub mod telemetry;

// ── Re-exports ──────────────────────────────────────────────────────

pub use ids::{InboundId, RelationId, UserId};
pub use preview::{
    BulkReorderSummary, BulkUserDiff, KeyOrder, PreviewDetail, QualityScore, ReorderOutcome,
    ReorderPreview,
};
pub use relation::{InboundMeta, UserDetail, UserInboundRelation};
pub use row::AccessKeyRow;
pub use telemetry::{DeviceTelemetrySample, PresenceSnapshot};
