//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};

use oneui_core::{
    CoreError, InboundId, KeySession, PanelClient, RelationId, UserId, UserInboundRelation,
};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub type Session = KeySession<PanelClient>;

/// Parse a user ID argument.
pub fn parse_user(raw: &str) -> Result<UserId, CliError> {
    Ok(raw.parse::<UserId>()?)
}

/// Parse an inbound ID argument (positive integer).
pub fn parse_inbound(raw: i64) -> Result<InboundId, CliError> {
    InboundId::new(raw).ok_or_else(|| CliError::Validation {
        field: "inbound".into(),
        reason: format!("{raw} is not a valid inbound ID (must be positive)"),
    })
}

/// Find the user's key on `inbound`.
pub fn relation_for(session: &Session, inbound: InboundId) -> Result<UserInboundRelation, CliError> {
    session
        .store()
        .relation_by_inbound(inbound)
        .ok_or_else(|| {
            CoreError::UnknownKey {
                identifier: format!("inbound {inbound}"),
            }
            .into()
        })
}

pub fn relation_id_for(session: &Session, raw: i64) -> Result<RelationId, CliError> {
    Ok(relation_for(session, parse_inbound(raw)?)?.id)
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without `--yes` and without a terminal to ask on, refuses.
pub fn confirm(action: &str, message: &str, global: &GlobalOpts) -> Result<bool, CliError> {
    if global.yes {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Spinner on stderr while waiting for the panel. Hidden with `--quiet`
/// or when stderr is not a terminal.
pub fn spinner(global: &GlobalOpts, message: &str) -> ProgressBar {
    if global.quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_owned());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Validate a `--window` value in minutes.
pub fn check_window(window: Option<u32>) -> Result<Option<u32>, CliError> {
    match window {
        Some(w) if !(1..=oneui_core::config::MAX_WINDOW_MINUTES).contains(&w) => {
            Err(CliError::Validation {
                field: "window".into(),
                reason: format!(
                    "{w} minutes is outside 1..={}",
                    oneui_core::config::MAX_WINDOW_MINUTES
                ),
            })
        }
        other => Ok(other),
    }
}

/// "3m ago" style rendering of a timestamp, `-` when unknown.
pub fn ago(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "-".into();
    };
    match (now - at).to_std() {
        // Whole seconds only.
        Ok(elapsed) => {
            let secs = Duration::from_secs(elapsed.as_secs());
            if secs.is_zero() {
                "just now".into()
            } else {
                format!("{} ago", humantime::format_duration(secs))
            }
        }
        Err(_) => "just now".into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn ago_formats_elapsed_time() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        assert_eq!(ago(None, now), "-");
        assert_eq!(ago(Some(now), now), "just now");
        assert_eq!(ago(Some(now - chrono::Duration::seconds(150)), now), "2m 30s ago");
        assert_eq!(ago(Some(now + chrono::Duration::seconds(5)), now), "just now");
    }

    #[test]
    fn window_must_be_in_range() {
        assert!(check_window(None).is_ok());
        assert!(check_window(Some(60)).is_ok());
        assert!(check_window(Some(0)).is_err());
        assert!(check_window(Some(20_000)).is_err());
    }

    #[test]
    fn inbound_must_be_positive() {
        assert!(parse_inbound(10).is_ok());
        assert!(parse_inbound(0).is_err());
    }
}
