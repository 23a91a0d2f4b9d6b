// ── Panel backend seam ──
//
// Everything the engine needs from the panel, as one trait. The real
// implementation is `oneui_api::PanelClient`; tests substitute an
// in-memory panel.

use std::future::Future;
use std::sync::Arc;

use oneui_api::transport::{TlsMode, TransportConfig};
use oneui_api::types::RelationPatch;
use oneui_api::{PanelClient, ReconnectConfig, StreamStatus};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{PanelConfig, TlsVerification};
use crate::convert;
use crate::error::CoreError;
use crate::model::{
    BulkReorderSummary, DeviceTelemetrySample, InboundId, PresenceSnapshot, ReorderPreview,
    UserDetail, UserId,
};
use crate::presence_channel::{ChannelStatus, PresenceFeed, PresenceFrame};
use crate::priority::PriorityAssignment;

/// Async operations against a panel.
pub trait PanelBackend: Send + Sync + 'static {
    /// A user with all of its access keys.
    fn fetch_user(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<UserDetail, CoreError>> + Send;

    /// Per-device telemetry over the last `window_minutes`.
    fn fetch_devices(
        &self,
        user: &UserId,
        window_minutes: u32,
    ) -> impl Future<Output = Result<Vec<DeviceTelemetrySample>, CoreError>> + Send;

    /// One-shot coarse presence for the given users.
    fn fetch_presence(
        &self,
        users: &[UserId],
        include_offline: bool,
    ) -> impl Future<Output = Result<Vec<PresenceSnapshot>, CoreError>> + Send;

    /// Open a live presence feed. `Ok(None)` means the backend only
    /// supports polling.
    fn open_presence_feed(
        &self,
        users: &[UserId],
        include_offline: bool,
        cancel: CancellationToken,
    ) -> Result<Option<PresenceFeed>, CoreError>;

    fn set_relation_enabled(
        &self,
        user: &UserId,
        inbound: InboundId,
        enabled: bool,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn set_relation_priority(
        &self,
        user: &UserId,
        inbound: InboundId,
        priority: i32,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Apply a full priority batch in one request.
    fn reorder_relations(
        &self,
        user: &UserId,
        assignments: &[PriorityAssignment],
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn reorder_by_pattern(
        &self,
        user: &UserId,
        pattern: &str,
        dry_run: bool,
    ) -> impl Future<Output = Result<ReorderPreview, CoreError>> + Send;

    fn reorder_by_quality(
        &self,
        user: &UserId,
        window_minutes: u32,
        dry_run: bool,
    ) -> impl Future<Output = Result<ReorderPreview, CoreError>> + Send;

    fn bulk_reorder_by_pattern(
        &self,
        users: &[UserId],
        pattern: &str,
        dry_run: bool,
    ) -> impl Future<Output = Result<BulkReorderSummary, CoreError>> + Send;

    fn bulk_reorder_by_quality(
        &self,
        users: &[UserId],
        window_minutes: u32,
        dry_run: bool,
    ) -> impl Future<Output = Result<BulkReorderSummary, CoreError>> + Send;

    fn revoke_device(
        &self,
        user: &UserId,
        fingerprint: &str,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;
}

// ── PanelClient ─────────────────────────────────────────────────────

/// Build an authenticated panel client from connection settings.
pub fn connect(config: &PanelConfig) -> Result<PanelClient, CoreError> {
    let transport = TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
    };
    Ok(PanelClient::new(
        config.url.as_str(),
        &config.token,
        &transport,
    )?)
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

fn wire_ids(users: &[UserId]) -> Vec<String> {
    users.iter().map(ToString::to_string).collect()
}

fn not_found_as_user(user: &UserId, err: oneui_api::Error) -> CoreError {
    if err.is_not_found() {
        CoreError::UserNotFound {
            user_id: user.to_string(),
        }
    } else {
        err.into()
    }
}

impl PanelBackend for PanelClient {
    async fn fetch_user(&self, user: &UserId) -> Result<UserDetail, CoreError> {
        self.get_user(user.as_str())
            .await
            .map(Into::into)
            .map_err(|e| not_found_as_user(user, e))
    }

    async fn fetch_devices(
        &self,
        user: &UserId,
        window_minutes: u32,
    ) -> Result<Vec<DeviceTelemetrySample>, CoreError> {
        let raw = self.list_devices(user.as_str(), window_minutes).await?;
        Ok(raw.into_iter().map(Into::into).collect())
    }

    async fn fetch_presence(
        &self,
        users: &[UserId],
        include_offline: bool,
    ) -> Result<Vec<PresenceSnapshot>, CoreError> {
        let raw = self.list_presence(&wire_ids(users), include_offline).await?;
        Ok(raw.into_iter().map(Into::into).collect())
    }

    fn open_presence_feed(
        &self,
        users: &[UserId],
        include_offline: bool,
        cancel: CancellationToken,
    ) -> Result<Option<PresenceFeed>, CoreError> {
        let handle = self.stream_presence(
            &wire_ids(users),
            include_offline,
            ReconnectConfig::default(),
            cancel.clone(),
        )?;
        let (frame_tx, frames) = watch::channel::<PresenceFrame>(None);
        let (status_tx, status) = watch::channel(ChannelStatus::Connecting);
        tokio::spawn(bridge_stream(
            handle.subscribe(),
            handle.status(),
            frame_tx,
            status_tx,
            cancel,
        ));
        Ok(Some(PresenceFeed { frames, status }))
    }

    async fn set_relation_enabled(
        &self,
        user: &UserId,
        inbound: InboundId,
        enabled: bool,
    ) -> Result<(), CoreError> {
        let patch = RelationPatch {
            enabled: Some(enabled),
            priority: None,
        };
        Ok(self
            .patch_relation(user.as_str(), inbound.get(), &patch)
            .await?)
    }

    async fn set_relation_priority(
        &self,
        user: &UserId,
        inbound: InboundId,
        priority: i32,
    ) -> Result<(), CoreError> {
        let patch = RelationPatch {
            enabled: None,
            priority: Some(priority),
        };
        Ok(self
            .patch_relation(user.as_str(), inbound.get(), &patch)
            .await?)
    }

    async fn reorder_relations(
        &self,
        user: &UserId,
        assignments: &[PriorityAssignment],
    ) -> Result<(), CoreError> {
        let body = assignments.iter().copied().map(Into::into).collect();
        Ok(PanelClient::reorder_relations(self, user.as_str(), body).await?)
    }

    async fn reorder_by_pattern(
        &self,
        user: &UserId,
        pattern: &str,
        dry_run: bool,
    ) -> Result<ReorderPreview, CoreError> {
        let raw = PanelClient::reorder_by_pattern(self, user.as_str(), pattern, dry_run)
            .await
            .map_err(|e| not_found_as_user(user, e))?;
        Ok(convert::pattern_preview(user, pattern, raw))
    }

    async fn reorder_by_quality(
        &self,
        user: &UserId,
        window_minutes: u32,
        dry_run: bool,
    ) -> Result<ReorderPreview, CoreError> {
        let raw = PanelClient::reorder_by_quality(self, user.as_str(), window_minutes, dry_run)
            .await
            .map_err(|e| not_found_as_user(user, e))?;
        Ok(convert::quality_preview(user, window_minutes, raw))
    }

    async fn bulk_reorder_by_pattern(
        &self,
        users: &[UserId],
        pattern: &str,
        dry_run: bool,
    ) -> Result<BulkReorderSummary, CoreError> {
        let raw =
            PanelClient::bulk_reorder_by_pattern(self, &wire_ids(users), pattern, dry_run).await?;
        Ok(raw.into())
    }

    async fn bulk_reorder_by_quality(
        &self,
        users: &[UserId],
        window_minutes: u32,
        dry_run: bool,
    ) -> Result<BulkReorderSummary, CoreError> {
        let raw =
            PanelClient::bulk_reorder_by_quality(self, &wire_ids(users), window_minutes, dry_run)
                .await?;
        Ok(raw.into())
    }

    async fn revoke_device(&self, user: &UserId, fingerprint: &str) -> Result<(), CoreError> {
        Ok(PanelClient::revoke_device(self, user.as_str(), fingerprint).await?)
    }
}

/// Forward wire frames and stream status into domain types until cancelled
/// or the stream task exits.
async fn bridge_stream(
    mut wire_frames: watch::Receiver<oneui_api::presence_stream::PresenceFrame>,
    mut wire_status: watch::Receiver<StreamStatus>,
    frame_tx: watch::Sender<PresenceFrame>,
    status_tx: watch::Sender<ChannelStatus>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = wire_frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = wire_frames.borrow_and_update().clone();
                if let Some(frame) = frame {
                    let snapshots: Vec<PresenceSnapshot> =
                        frame.iter().cloned().map(Into::into).collect();
                    frame_tx.send_replace(Some(Arc::new(snapshots)));
                }
            }
            changed = wire_status.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *wire_status.borrow_and_update();
                status_tx.send_replace(status.into());
            }
        }
    }
    status_tx.send_replace(ChannelStatus::Idle);
    debug!("presence bridge exiting");
}
