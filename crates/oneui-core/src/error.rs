// ── Core error types ──
//
// User-facing errors from oneui-core. Consumers never see raw HTTP
// status codes or JSON parse failures; the `From<oneui_api::Error>` impl
// translates transport-layer errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to panel at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Panel request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("User not found: {user_id}")]
    UserNotFound { user_id: String },

    #[error("Access key not found: {identifier}")]
    UnknownKey { identifier: String },

    #[error("Entity not found: {entity_type} with id {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    // ── Precondition errors ──────────────────────────────────────────
    // Raised client-side before anything is sent to the panel.
    #[error("Drag reordering is unavailable: {reason}")]
    GateClosed { reason: String },

    #[error("A reorder is already in progress for user {user_id}")]
    ReorderInFlight { user_id: String },

    #[error("Access key {relation_id} is busy with another change")]
    RelationBusy { relation_id: i64 },

    #[error("No drag in progress")]
    NotDragging,

    #[error("Key dropped onto itself")]
    SameTarget,

    #[error("User {user_id} has no access keys to reorder")]
    NoEligibleKeys { user_id: String },

    #[error("No keys of user {user_id} match pattern '{pattern}'")]
    NoPatternMatch { user_id: String, pattern: String },

    #[error("No connection activity for user {user_id} in the last {window_minutes} minutes")]
    NoRecentActivity { user_id: String, window_minutes: u32 },

    #[error("No user is open in this session")]
    NoActiveUser,

    #[error("No reorder preview is pending")]
    NoPendingPreview,

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Operation rejected by panel: {message}")]
    Rejected { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the operation was refused locally without contacting the panel
    /// (or after a dry run showed there was nothing to do).
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::GateClosed { .. }
                | Self::ReorderInFlight { .. }
                | Self::RelationBusy { .. }
                | Self::NotDragging
                | Self::SameTarget
                | Self::NoEligibleKeys { .. }
                | Self::NoPatternMatch { .. }
                | Self::NoRecentActivity { .. }
                | Self::NoActiveUser
                | Self::NoPendingPreview
        )
    }

    /// Whether another attempt could reasonably succeed without user action.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } => true,
            Self::Api {
                status: Some(status),
                ..
            } => *status >= 500,
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<oneui_api::Error> for CoreError {
    fn from(err: oneui_api::Error) -> Self {
        match err {
            oneui_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            oneui_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(|u| u.to_string())
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else if e.status().map(|s| s.as_u16()) == Some(404) {
                    CoreError::NotFound {
                        entity_type: "resource".into(),
                        identifier: e.url().map(|u| u.path().to_string()).unwrap_or_default(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            oneui_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            oneui_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            oneui_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            oneui_api::Error::Panel { status: 404, message } => CoreError::NotFound {
                entity_type: "resource".into(),
                identifier: message,
            },
            oneui_api::Error::Panel { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            oneui_api::Error::Rejected { message } => CoreError::Rejected { message },
            oneui_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            oneui_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            oneui_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
