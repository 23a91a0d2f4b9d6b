// ── Presence channel ──
//
// Keeps the store's per-user presence snapshot current. Prefers the
// live stream; while the stream is not connected (or not available) it
// polls on a fixed period. Consumers only ever read the latest snapshot.

use std::sync::Arc;

use oneui_api::StreamStatus;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::PanelBackend;
use crate::config::PresenceConfig;
use crate::model::{PresenceSnapshot, UserId};
use crate::store::{DataSource, DataStore};

/// Latest presence frame, `None` until the first one arrives.
pub type PresenceFrame = Option<Arc<Vec<PresenceSnapshot>>>;

/// Connection status of the presence channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChannelStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Error,
}

impl From<StreamStatus> for ChannelStatus {
    fn from(s: StreamStatus) -> Self {
        match s {
            StreamStatus::Idle => Self::Idle,
            StreamStatus::Connecting => Self::Connecting,
            StreamStatus::Connected => Self::Connected,
            StreamStatus::Error => Self::Error,
        }
    }
}

/// Where the latest presence snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PresenceSource {
    #[default]
    None,
    Stream,
    Poll,
}

/// A live presence feed opened by a backend.
pub struct PresenceFeed {
    pub frames: watch::Receiver<PresenceFrame>,
    pub status: watch::Receiver<ChannelStatus>,
}

// ── PresenceChannel ─────────────────────────────────────────────────

/// Observable state of the presence channel.
#[derive(Debug)]
pub struct PresenceChannel {
    status: watch::Sender<ChannelStatus>,
    source: watch::Sender<PresenceSource>,
}

impl Default for PresenceChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceChannel {
    pub fn new() -> Self {
        let (status, _) = watch::channel(ChannelStatus::Idle);
        let (source, _) = watch::channel(PresenceSource::None);
        Self { status, source }
    }

    pub fn status(&self) -> ChannelStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status.subscribe()
    }

    pub fn source(&self) -> PresenceSource {
        *self.source.borrow()
    }

    fn set_status(&self, status: ChannelStatus) {
        self.status.send_if_modified(|cur| {
            let changed = *cur != status;
            *cur = status;
            changed
        });
    }

    fn set_source(&self, source: PresenceSource) {
        self.source.send_replace(source);
    }

    pub(crate) fn reset(&self) {
        self.set_status(ChannelStatus::Idle);
        self.set_source(PresenceSource::None);
    }
}

// ── Background task ─────────────────────────────────────────────────

/// Drive presence for one user until cancelled.
pub(crate) async fn run<B: PanelBackend>(
    backend: Arc<B>,
    user: UserId,
    config: PresenceConfig,
    store: Arc<DataStore>,
    channel: Arc<PresenceChannel>,
    cancel: CancellationToken,
) {
    let users = [user];

    let feed = if config.live {
        backend
            .open_presence_feed(&users, config.include_offline, cancel.child_token())
            .unwrap_or_else(|e| {
                warn!(error = %e, "presence stream unavailable, polling instead");
                None
            })
    } else {
        None
    };

    let (mut frames, mut stream_status) = match feed {
        Some(feed) => {
            channel.set_status(ChannelStatus::Connecting);
            (Some(feed.frames), Some(feed.status))
        }
        None => (None, None),
    };

    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = next_change(&mut frames) => {
                match frame {
                    Some(Some(snapshots)) => {
                        store.apply_presence(&snapshots);
                        channel.set_source(PresenceSource::Stream);
                    }
                    Some(None) => {}
                    None => {
                        debug!("presence stream closed, polling only");
                        frames = None;
                    }
                }
            }
            status = next_change(&mut stream_status) => {
                match status {
                    Some(status) => channel.set_status(status),
                    None => stream_status = None,
                }
            }
            _ = interval.tick() => {
                let streaming = frames.is_some() && channel.status() == ChannelStatus::Connected;
                if !streaming {
                    poll_once(backend.as_ref(), &users, &config, &store, &channel, frames.is_none())
                        .await;
                }
            }
        }
    }

    channel.set_status(ChannelStatus::Idle);
    debug!("presence channel stopped");
}

async fn poll_once<B: PanelBackend>(
    backend: &B,
    users: &[UserId],
    config: &PresenceConfig,
    store: &DataStore,
    channel: &PresenceChannel,
    owns_status: bool,
) {
    match backend.fetch_presence(users, config.include_offline).await {
        Ok(snapshots) => {
            store.apply_presence(&snapshots);
            channel.set_source(PresenceSource::Poll);
            if owns_status {
                channel.set_status(ChannelStatus::Connected);
            }
        }
        Err(e) => {
            warn!(error = %e, "presence poll failed");
            store.mark_failed(DataSource::Presence, &e);
            if owns_status {
                channel.set_status(ChannelStatus::Error);
            }
        }
    }
}

/// Wait for the next value on an optional receiver. Pends forever when
/// there is no receiver; yields `None` once the sender is gone.
async fn next_change<T: Clone>(rx: &mut Option<watch::Receiver<T>>) -> Option<T> {
    let Some(rx) = rx.as_mut() else {
        return std::future::pending().await;
    };
    rx.changed().await.ok()?;
    Some(rx.borrow_and_update().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_status_maps_one_to_one() {
        assert_eq!(
            ChannelStatus::from(StreamStatus::Connected),
            ChannelStatus::Connected
        );
        assert_eq!(ChannelStatus::from(StreamStatus::Error), ChannelStatus::Error);
    }

    #[test]
    fn new_channel_is_idle() {
        let channel = PresenceChannel::new();
        assert_eq!(channel.status(), ChannelStatus::Idle);
        assert_eq!(channel.source(), PresenceSource::None);
    }

    #[tokio::test]
    async fn next_change_ends_when_sender_drops() {
        let (tx, rx) = watch::channel(1u8);
        let mut rx = Some(rx);
        tx.send_replace(2);
        assert_eq!(next_change(&mut rx).await, Some(2));
        drop(tx);
        assert_eq!(next_change(&mut rx).await, None);
    }
}
