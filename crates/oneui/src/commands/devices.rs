//! Device command handlers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tabled::Tabled;

use oneui_core::{DeviceTelemetrySample, InboundId, PanelClient, PollInterval, SessionConfig};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

/// A telemetry sample with the label of the key it was seen on.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceView {
    #[serde(flatten)]
    sample: DeviceTelemetrySample,
    key: Option<String>,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
    #[tabled(rename = "Client IP")]
    client_ip: String,
}

impl From<&DeviceView> for DeviceRow {
    fn from(d: &DeviceView) -> Self {
        Self {
            fingerprint: d.sample.fingerprint.clone(),
            key: d.key.clone().unwrap_or_else(|| "-".into()),
            status: if d.sample.online { "online" } else { "offline" }.into(),
            last_seen: util::ago(d.sample.last_seen_at, Utc::now()),
            client_ip: d.sample.client_ip.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

fn device_views(session: &util::Session) -> Vec<DeviceView> {
    let labels: HashMap<InboundId, String> = session
        .rows()
        .iter()
        .filter_map(|r| Some((r.inbound_id?, r.label.clone())))
        .collect();
    let mut out: Vec<DeviceView> = session
        .store()
        .telemetry()
        .iter()
        .map(|sample| DeviceView {
            key: sample.inbound_id.and_then(|id| labels.get(&id).cloned()),
            sample: sample.clone(),
        })
        .collect();
    // Online first, then most recently seen.
    out.sort_by(|a, b| {
        b.sample
            .online
            .cmp(&a.sample.online)
            .then_with(|| b.sample.last_seen_at.cmp(&a.sample.last_seen_at))
    });
    out
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    client: Arc<PanelClient>,
    mut config: SessionConfig,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List { user, window } => {
            let user = util::parse_user(&user)?;
            if let Some(window) = util::check_window(window)? {
                config.telemetry_window_minutes = window;
            }
            // Off skips the telemetry fetch.
            if config.poll_interval == PollInterval::Off {
                config.poll_interval = PollInterval::Manual;
            }

            let list = util::Session::oneshot(client, config, user, |s| async move {
                Ok::<_, CliError>(device_views(&s))
            })
            .await?;
            let out = output::render_list(
                &global.output,
                &list,
                |d| DeviceRow::from(d),
                |d| d.sample.fingerprint.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Revoke { user, fingerprint } => {
            let user = util::parse_user(&user)?;
            if !util::confirm(
                "devices revoke",
                &format!("Revoke device {fingerprint} of user {user}?"),
                global,
            )? {
                return Ok(());
            }
            let fp = fingerprint.clone();
            util::Session::oneshot(client, config, user, |s| async move {
                s.revoke_device(&fp).await.map_err(CliError::from)
            })
            .await?;
            output::success(global, &format!("Device {fingerprint} revoked"));
            Ok(())
        }
    }
}
