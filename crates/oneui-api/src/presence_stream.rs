//! Live presence stream with auto-reconnect.
//!
//! Connects to the panel's presence WebSocket and publishes every full
//! presence snapshot through a [`tokio::sync::watch`] channel, alongside the
//! connection status. Handles reconnection with exponential backoff + jitter.
//!
//! # Example
//!
//! ```rust,ignore
//! use oneui_api::{PanelClient, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let handle = client.stream_presence(&["42".into()], true, ReconnectConfig::default(), cancel)?;
//! let mut rx = handle.subscribe();
//!
//! while rx.changed().await.is_ok() {
//!     if let Some(snapshot) = rx.borrow_and_update().clone() {
//!         println!("{} users reported", snapshot.len());
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::types::PresenceResponse;

/// Latest full presence snapshot, `None` until the first frame arrives.
pub type PresenceFrame = Option<Arc<Vec<PresenceResponse>>>;

// ── StreamStatus ─────────────────────────────────────────────────────

/// Connection status of the presence stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Error,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for stream reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── PresenceStreamHandle ─────────────────────────────────────────────

/// Handle to a running presence stream.
///
/// Dropping the handle does not stop the background task; call
/// [`shutdown`](Self::shutdown) or cancel the token passed at connect time.
pub struct PresenceStreamHandle {
    frames: watch::Receiver<PresenceFrame>,
    status: watch::Receiver<StreamStatus>,
    cancel: CancellationToken,
}

impl PresenceStreamHandle {
    /// Spawn the reconnection loop and return immediately.
    pub(crate) fn connect(
        url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
        authorization: Option<String>,
    ) -> Self {
        let (frame_tx, frames) = watch::channel(None);
        let (status_tx, status) = watch::channel(StreamStatus::Connecting);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            stream_loop(
                url,
                frame_tx,
                status_tx,
                reconnect,
                task_cancel,
                authorization,
            )
            .await;
        });

        Self {
            frames,
            status,
            cancel,
        }
    }

    /// A new receiver for presence snapshots.
    pub fn subscribe(&self) -> watch::Receiver<PresenceFrame> {
        self.frames.clone()
    }

    /// A new receiver for the connection status.
    pub fn status(&self) -> watch::Receiver<StreamStatus> {
        self.status.clone()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error, backoff → reconnect.
async fn stream_loop(
    url: Url,
    frame_tx: watch::Sender<PresenceFrame>,
    status_tx: watch::Sender<StreamStatus>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    authorization: Option<String>,
) {
    let mut attempt: u32 = 0;

    loop {
        status_tx.send_replace(StreamStatus::Connecting);
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&url, &frame_tx, &status_tx, &cancel, authorization.as_deref()) => {
                match result {
                    Ok(()) => {
                        tracing::info!("presence stream disconnected cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        status_tx.send_replace(StreamStatus::Error);
                        tracing::warn!(error = %e, attempt, "presence stream error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "presence stream reconnection limit reached, giving up"
                                );
                                return;
                            }
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        tracing::debug!(
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            attempt,
                            "waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }

                        attempt = attempt.saturating_add(1);
                    }
                }
            }
        }
    }

    status_tx.send_replace(StreamStatus::Idle);
    tracing::debug!("presence stream loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

async fn connect_and_read(
    url: &Url,
    frame_tx: &watch::Sender<PresenceFrame>,
    status_tx: &watch::Sender<StreamStatus>,
    cancel: &CancellationToken,
    authorization: Option<&str>,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting to presence stream");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(value) = authorization {
        request = request.with_header("Authorization", value);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    status_tx.send_replace(StreamStatus::Connected);
    tracing::info!("presence stream connected");

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(snapshot) = parse_frame(&text) {
                            frame_tx.send_replace(Some(Arc::new(snapshot)));
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(cf) = frame.filter(|cf| cf.code != CloseCode::Normal) {
                            return Err(Error::WebSocketClosed {
                                code: u16::from(cf.code),
                                reason: cf.reason.to_string(),
                            });
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("presence stream ended");
                        return Ok(());
                    }
                    // Ping is answered by tungstenite; binary and pong are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Frames are either `{ "type": "presence", "data": [...] }` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PresenceMessage {
    Typed {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        data: Vec<PresenceResponse>,
    },
    Bare(Vec<PresenceResponse>),
}

fn parse_frame(text: &str) -> Option<Vec<PresenceResponse>> {
    match serde_json::from_str::<PresenceMessage>(text) {
        Ok(PresenceMessage::Typed { kind, data }) if kind == "presence" => Some(data),
        Ok(PresenceMessage::Typed { kind, .. }) => {
            tracing::trace!(kind, "ignoring non-presence frame");
            None
        }
        Ok(PresenceMessage::Bare(data)) => Some(data),
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse presence frame");
            None
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();
        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);
        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };
        let d = calculate_backoff(20, &config);
        assert!(d <= Duration::from_secs_f64(12.5), "{d:?} exceeds cap + jitter");
    }

    #[test]
    fn parses_typed_presence_frame() {
        let frame = r#"{"type":"presence","data":[{"userId":"9","online":true,"lastSeenAt":"2026-01-02T03:04:05Z"}]}"#;
        let data = parse_frame(frame).expect("presence frame");
        assert_eq!(data.len(), 1);
        assert!(data[0].online);
        assert!(data[0].last_seen_at.is_some());
    }

    #[test]
    fn parses_bare_array_frame() {
        let data = parse_frame(r#"[{"userId":"1"}]"#).expect("bare frame");
        assert!(!data[0].online);
    }

    #[test]
    fn ignores_other_frame_types() {
        assert!(parse_frame(r#"{"type":"heartbeat"}"#).is_none());
        assert!(parse_frame("not json").is_none());
    }
}
