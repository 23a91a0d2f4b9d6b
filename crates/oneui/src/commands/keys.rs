//! Access-key command handlers.

use std::sync::Arc;

use chrono::Utc;
use tabled::Tabled;

use oneui_core::{
    AccessKeyRow, CommandResult, KeyFilter, KeySession, PanelClient, PollInterval,
    PriorityAssignment, RelationId, SessionConfig, SortDirection, SortField, ViewSpec,
};

use crate::cli::{
    GlobalOpts, KeyFilterArg, KeySortArg, KeysArgs, KeysCommand, ViewArgs, WatchInterval,
};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct KeyRow {
    #[tabled(rename = "Inbound")]
    inbound: String,
    #[tabled(rename = "Key")]
    label: String,
    #[tabled(rename = "Protocol")]
    protocol: String,
    #[tabled(rename = "Port")]
    port: u16,
    #[tabled(rename = "Priority")]
    priority: i32,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Devices")]
    devices: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
    #[tabled(rename = "Expires")]
    expires: String,
}

impl KeyRow {
    fn new(row: &AccessKeyRow, marked: bool) -> Self {
        let now = Utc::now();
        Self {
            inbound: row
                .inbound_id
                .map_or_else(|| "-".into(), |id| id.to_string()),
            label: if marked {
                format!("★ {}", row.label)
            } else {
                row.label.clone()
            },
            protocol: transport(row),
            port: row.port,
            priority: row.priority,
            enabled: if row.enabled { "yes" } else { "no" }.into(),
            status: if row.online { "online" } else { "offline" }.into(),
            devices: format!("{}/{}", row.online_devices, row.seen_devices),
            last_seen: util::ago(row.last_seen_at, now),
            expires: match row.expiration_days {
                None => "never".into(),
                Some(d) if d < 0 => "expired".into(),
                Some(d) => format!("{d}d"),
            },
        }
    }
}

/// `vless/ws/tls`, skipping unknown parts.
fn transport(row: &AccessKeyRow) -> String {
    [
        Some(row.protocol.as_str()),
        row.network.as_deref(),
        row.security.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join("/")
}

#[derive(Tabled)]
struct AssignmentRow {
    #[tabled(rename = "Inbound")]
    inbound: String,
    #[tabled(rename = "Priority")]
    priority: i32,
}

// ── View conversion ─────────────────────────────────────────────────

fn view_spec(args: &ViewArgs) -> ViewSpec {
    ViewSpec {
        filter: match args.filter {
            KeyFilterArg::All => KeyFilter::All,
            KeyFilterArg::Enabled => KeyFilter::Enabled,
            KeyFilterArg::Disabled => KeyFilter::Disabled,
            KeyFilterArg::Online => KeyFilter::Online,
            KeyFilterArg::Offline => KeyFilter::Offline,
        },
        sort: match args.sort {
            KeySortArg::Key => SortField::Key,
            KeySortArg::Protocol => SortField::Protocol,
            KeySortArg::Port => SortField::Port,
            KeySortArg::Priority => SortField::Priority,
            KeySortArg::Enabled => SortField::Enabled,
            KeySortArg::Online => SortField::Online,
            KeySortArg::Expiration => SortField::Expiration,
        },
        direction: if args.desc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        },
    }
}

fn render_rows(
    global: &GlobalOpts,
    rows: &[AccessKeyRow],
    marked: &[RelationId],
) -> Result<String, CliError> {
    output::render_list(
        &global.output,
        rows,
        |r| KeyRow::new(r, marked.contains(&r.relation_id)),
        |r| r.inbound_id.map_or_else(|| r.relation_id.to_string(), |id| id.to_string()),
    )
}

fn warn_stale(session: &util::Session) {
    let freshness = session.freshness();
    for (source, state) in [
        ("relations", &freshness.relations),
        ("telemetry", &freshness.telemetry),
        ("presence", &freshness.presence),
    ] {
        if state.stale {
            eprintln!(
                "warning: {source} could not be refreshed ({}); showing last known data",
                state.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
pub async fn handle(
    client: Arc<PanelClient>,
    config: SessionConfig,
    args: KeysArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        KeysCommand::List {
            user,
            view,
            pattern,
        } => {
            let user = util::parse_user(&user)?;
            let spec = view_spec(&view);
            let (rows, marked) = util::Session::oneshot(client, config, user, |s| {
                list_rows(s, spec, pattern)
            })
            .await?;

            let out = render_rows(global, &rows, &marked)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        KeysCommand::Watch {
            user,
            view,
            interval,
        } => watch(client, config, &user, &view, interval, global).await,

        KeysCommand::Move {
            user,
            source,
            target,
        } => {
            let user = util::parse_user(&user)?;
            let assignments = util::Session::oneshot(client, config, user, |s| {
                move_key(s, source, target)
            })
            .await?;

            output::success(global, &format!("Reordered {} keys", assignments.len()));
            let out = output::render_list(
                &global.output,
                &assignments,
                |a| AssignmentRow {
                    inbound: a.inbound_id.to_string(),
                    priority: a.priority,
                },
                |a| format!("{} {}", a.inbound_id, a.priority),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        KeysCommand::Toggle {
            user,
            inbound,
            enable,
            disable,
        } => {
            let user = util::parse_user(&user)?;
            let inbound = util::parse_inbound(inbound)?;
            let enabled = enable && !disable;
            let result = util::Session::oneshot(client, config, user, |s| async move {
                s.toggle(inbound, enabled).await.map_err(CliError::from)
            })
            .await?;

            let label = match result {
                CommandResult::Relation(ref r) => r.label(),
                CommandResult::Ok => format!("inbound {inbound}"),
            };
            let state = if enabled { "enabled" } else { "disabled" };
            output::success(global, &format!("Key {label} {state}"));
            Ok(())
        }

        KeysCommand::Priority {
            user,
            inbound,
            priority,
        } => {
            let user = util::parse_user(&user)?;
            let inbound = util::parse_inbound(inbound)?;
            let result = util::Session::oneshot(client, config, user, |s| async move {
                s.set_priority(inbound, priority).await.map_err(CliError::from)
            })
            .await?;

            let label = match result {
                CommandResult::Relation(ref r) => r.label(),
                CommandResult::Ok => format!("inbound {inbound}"),
            };
            output::success(global, &format!("Key {label} now has priority {priority}"));
            Ok(())
        }
    }
}

async fn list_rows(
    session: util::Session,
    spec: ViewSpec,
    pattern: Option<String>,
) -> Result<(Vec<AccessKeyRow>, Vec<RelationId>), CliError> {
    session.set_view(spec).await;
    let marked = match pattern {
        Some(ref name) => session.pattern_matches(name)?,
        None => Vec::new(),
    };
    warn_stale(&session);
    Ok((session.view_rows().await, marked))
}

async fn move_key(
    session: util::Session,
    source: i64,
    target: i64,
) -> Result<Vec<PriorityAssignment>, CliError> {
    let source = util::relation_id_for(&session, source)?;
    let target = util::relation_id_for(&session, target)?;
    Ok(session.move_key(source, target).await?)
}

// ── Watch ───────────────────────────────────────────────────────────

async fn watch(
    client: Arc<PanelClient>,
    mut config: SessionConfig,
    user: &str,
    view: &ViewArgs,
    interval: WatchInterval,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let user = util::parse_user(user)?;
    config.poll_interval = match interval {
        WatchInterval::FiveSeconds => PollInterval::FiveSeconds,
        WatchInterval::TenSeconds => PollInterval::TenSeconds,
        WatchInterval::ThirtySeconds => PollInterval::ThirtySeconds,
    };
    if let Some(period) = config.poll_interval.period() {
        config.presence.poll_interval = period;
    }

    let session = KeySession::new(client, config);
    session.set_view(view_spec(view)).await;
    if let Err(e) = session.start(user.clone()).await {
        if !e.is_transient() {
            return Err(e.into());
        }
        tracing::warn!(error = %e, "initial fetch failed, retrying in the background");
    }

    let mut rows = session.subscribe_rows();
    let result = loop {
        let out = match render_rows(global, &session.view_rows().await, &[]) {
            Ok(out) => out,
            Err(e) => break Err(e),
        };
        output::heading(
            global,
            &format!(
                "user {user} · presence {} via {} · {}",
                session.presence_status(),
                session.presence_source(),
                Utc::now().format("%H:%M:%S")
            ),
        );
        output::print_output(&out, global.quiet);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            changed = rows.changed() => {
                if changed.is_none() {
                    break Ok(());
                }
            }
        }
    };

    session.stop().await;
    result
}
