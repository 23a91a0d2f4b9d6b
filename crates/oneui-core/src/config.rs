// ── Runtime session configuration ──
//
// These types describe how to reach a panel and how a key session
// behaves. They carry credentials and tuning but never touch disk; the
// CLI builds them from `oneui-config` profiles and hands them in.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::priority::DEFAULT_PRIORITY_BASE;
use crate::reorder::pattern::PatternPolicy;

/// Default look-back for device telemetry and quality scoring.
pub const DEFAULT_WINDOW_MINUTES: u32 = 60;

/// Longest window the panel accepts for telemetry and quality scoring (7 days).
pub const MAX_WINDOW_MINUTES: u32 = 10_080;

// ── Connection ──────────────────────────────────────────────────────

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed panels reached by IP).
    DangerAcceptInvalid,
}

/// How to reach one panel.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Panel base URL (e.g., `https://vpn.example.com:9290`).
    pub url: Url,
    /// Admin bearer token.
    pub token: SecretString,
    pub tls: TlsVerification,
    /// Per-request timeout.
    pub timeout: Duration,
}

// ── Polling ─────────────────────────────────────────────────────────

/// How often relations and telemetry are re-fetched in the background.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter
)]
pub enum PollInterval {
    /// Telemetry is not fetched at all; rows rely on presence only.
    #[serde(rename = "off")]
    #[strum(serialize = "off")]
    Off,
    /// No background polling; refresh on demand and after mutations.
    #[serde(rename = "manual")]
    #[strum(serialize = "manual")]
    Manual,
    #[serde(rename = "5s")]
    #[strum(serialize = "5s")]
    FiveSeconds,
    #[default]
    #[serde(rename = "10s")]
    #[strum(serialize = "10s")]
    TenSeconds,
    #[serde(rename = "30s")]
    #[strum(serialize = "30s")]
    ThirtySeconds,
}

impl PollInterval {
    /// Timer period, or `None` when nothing runs in the background.
    pub fn period(self) -> Option<Duration> {
        match self {
            Self::Off | Self::Manual => None,
            Self::FiveSeconds => Some(Duration::from_secs(5)),
            Self::TenSeconds => Some(Duration::from_secs(10)),
            Self::ThirtySeconds => Some(Duration::from_secs(30)),
        }
    }

    /// Whether device telemetry is fetched at all.
    pub fn telemetry_enabled(self) -> bool {
        self != Self::Off
    }
}

// ── Presence ────────────────────────────────────────────────────────

/// Presence channel tuning.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Prefer the live WebSocket stream over polling.
    pub live: bool,
    /// Include offline users in presence frames.
    pub include_offline: bool,
    /// Fallback poll period while the stream is not connected.
    pub poll_interval: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            live: true,
            include_offline: true,
            poll_interval: Duration::from_secs(10),
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// Behaviour of a [`KeySession`](crate::KeySession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub poll_interval: PollInterval,
    /// Look-back window for device telemetry.
    pub telemetry_window_minutes: u32,
    /// Default look-back window for quality reorders.
    pub quality_window_minutes: u32,
    /// First priority handed out by drag reorders.
    pub priority_base: i32,
    pub presence: PresenceConfig,
    /// Known pattern policies, used to mark matching keys locally.
    pub patterns: Vec<PatternPolicy>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: PollInterval::default(),
            telemetry_window_minutes: DEFAULT_WINDOW_MINUTES,
            quality_window_minutes: DEFAULT_WINDOW_MINUTES,
            priority_base: DEFAULT_PRIORITY_BASE,
            presence: PresenceConfig::default(),
            patterns: vec![PatternPolicy::myanmar()],
        }
    }
}

impl SessionConfig {
    /// Same settings without background work: no poll timer (telemetry
    /// stays off if it was off) and no live presence stream.
    pub fn one_shot(mut self) -> Self {
        if self.poll_interval != PollInterval::Off {
            self.poll_interval = PollInterval::Manual;
        }
        self.presence.live = false;
        self
    }

    /// Look up a pattern policy by (case-insensitive) name.
    pub fn pattern(&self, name: &str) -> Option<&PatternPolicy> {
        self.patterns
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}
