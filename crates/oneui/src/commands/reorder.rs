//! Pattern, quality and bulk reorder handlers.
//!
//! Every reorder is a two-step exchange: the panel computes a dry run,
//! the preview is shown, and only a confirmed preview is applied.

use std::fmt::Write as _;
use std::sync::Arc;

use tabled::Tabled;

use oneui_core::{
    BulkReorderCoordinator, BulkReorderSummary, BulkStrategy, KeyOrder, PanelClient,
    PreviewDetail, ReorderLock, ReorderPreview, SessionConfig, UserId,
};

use crate::cli::{GlobalOpts, ReorderArgs, ReorderCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct TopRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "New")]
    new: String,
}

#[derive(Tabled)]
struct ScoreRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Connects")]
    connects: u32,
    #[tabled(rename = "Limit Rejects")]
    limit_rejects: u32,
    #[tabled(rename = "Reconnects")]
    reconnects: u32,
    #[tabled(rename = "New Priority")]
    to_priority: i32,
}

#[derive(Tabled)]
struct UserDiffRow {
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Changed")]
    changed: u32,
    #[tabled(rename = "Before")]
    before: String,
    #[tabled(rename = "After")]
    after: String,
}

fn order_label(entry: Option<&KeyOrder>) -> String {
    entry.map_or_else(String::new, |k| format!("{} ({})", k.key, k.priority))
}

fn top3_table(current: &[KeyOrder], new: &[KeyOrder]) -> String {
    let rows: Vec<TopRow> = (0..current.len().max(new.len()))
        .map(|i| TopRow {
            rank: i + 1,
            current: order_label(current.get(i)),
            new: order_label(new.get(i)),
        })
        .collect();
    output::render_table(&rows)
}

fn preview_detail(preview: &ReorderPreview) -> String {
    let mut out = String::new();
    let eligible = match preview.detail {
        PreviewDetail::Pattern { ref pattern } => {
            let _ = writeln!(out, "Pattern:  {pattern}");
            "Matched:"
        }
        PreviewDetail::Quality { window_minutes, .. } => {
            let _ = writeln!(out, "Window:   {window_minutes} min");
            "Scored: "
        }
    };
    let _ = writeln!(out, "User:     {}", preview.user_id);
    let _ = writeln!(out, "Keys:     {}", preview.total_keys);
    let _ = writeln!(out, "{eligible}  {}", preview.eligible_keys);
    let _ = writeln!(out, "Changed:  {}", preview.changed_keys);
    let _ = writeln!(out);
    out.push_str(&top3_table(&preview.current_top3, &preview.new_top3));

    if let PreviewDetail::Quality { ref scores, .. } = preview.detail {
        if !scores.is_empty() {
            let rows: Vec<ScoreRow> = scores
                .iter()
                .map(|s| ScoreRow {
                    key: s.key.clone(),
                    score: format!("{:.2}", s.score),
                    connects: s.connect_successes,
                    limit_rejects: s.limit_rejects,
                    reconnects: s.reconnects,
                    to_priority: s.to_priority,
                })
                .collect();
            let _ = writeln!(out);
            out.push_str(&output::render_table(&rows));
        }
    }
    out
}

fn bulk_detail(summary: &BulkReorderSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Users:          {}", summary.target_users);
    let _ = writeln!(out, "Would update:   {}", summary.would_update_users);
    let _ = writeln!(out, "Unchanged:      {}", summary.unchanged_users);
    if let Some(matched) = summary.matched_users {
        let _ = writeln!(out, "Matched users:  {matched}");
    }
    if let Some(scored) = summary.scored_keys {
        let _ = writeln!(out, "Scored keys:    {scored}");
    }
    let _ = writeln!(out, "Changed keys:   {}", summary.changed_keys);

    if !summary.preview.is_empty() {
        let rows: Vec<UserDiffRow> = summary
            .preview
            .iter()
            .map(|d| UserDiffRow {
                user: d.username.clone().unwrap_or_else(|| d.user_id.to_string()),
                changed: d.changed_keys,
                before: d.before.join(", "),
                after: d.after.join(", "),
            })
            .collect();
        let _ = writeln!(out);
        out.push_str(&output::render_table(&rows));
    }
    out
}

// ── Single user ─────────────────────────────────────────────────────

enum Strategy {
    Pattern(String),
    Quality(Option<u32>),
}

async fn reorder_user(
    session: util::Session,
    strategy: Strategy,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let spinner = util::spinner(global, "Computing dry run...");
    let preview = match strategy {
        Strategy::Pattern(ref pattern) => session.preview_pattern(pattern).await,
        Strategy::Quality(window) => session.preview_quality(window).await,
    };
    spinner.finish_and_clear();
    let preview = preview?;

    let out = output::render_single(&global.output, &preview, preview_detail, |p| {
        p.changed_keys.to_string()
    })?;
    output::print_output(&out, global.quiet);

    if preview.is_noop() {
        session.cancel_reorder().await;
        output::success(global, "Keys are already in the preferred order");
        return Ok(());
    }

    let prompt = format!(
        "Apply the new order ({} of {} keys change)?",
        preview.changed_keys, preview.total_keys
    );
    if !util::confirm("reorder", &prompt, global)? {
        session.cancel_reorder().await;
        output::heading(global, "Cancelled, nothing was changed");
        return Ok(());
    }

    let spinner = util::spinner(global, "Applying...");
    let outcome = session.confirm_reorder().await;
    spinner.finish_and_clear();
    let outcome = outcome?;

    output::success(
        global,
        &format!(
            "Reordered {} of {} keys",
            outcome.changed_keys, outcome.total_keys
        ),
    );
    Ok(())
}

// ── Bulk ────────────────────────────────────────────────────────────

async fn reorder_bulk(
    client: Arc<PanelClient>,
    users: &[String],
    strategy: BulkStrategy,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let users = users
        .iter()
        .map(|u| util::parse_user(u))
        .collect::<Result<Vec<UserId>, _>>()?;
    let coordinator = BulkReorderCoordinator::new(client, ReorderLock::new());

    let spinner = util::spinner(global, "Computing dry run...");
    let plan = coordinator.preview(users, strategy).await;
    spinner.finish_and_clear();
    let plan = plan?;

    let out = output::render_single(&global.output, plan.summary(), bulk_detail, |s| {
        s.would_update_users.to_string()
    })?;
    output::print_output(&out, global.quiet);

    if plan.is_noop() {
        output::success(global, "No user needs reordering");
        return Ok(());
    }

    let prompt = format!(
        "Reorder keys of {} users?",
        plan.summary().would_update_users
    );
    if !util::confirm("bulk reorder", &prompt, global)? {
        output::heading(global, "Cancelled, nothing was changed");
        return Ok(());
    }

    let spinner = util::spinner(global, "Applying...");
    let applied = coordinator.apply(&plan).await;
    spinner.finish_and_clear();
    let applied = applied?;

    output::success(
        global,
        &format!(
            "Updated {} users ({} keys changed, {} unchanged)",
            applied.would_update_users, applied.changed_keys, applied.unchanged_users
        ),
    );
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    client: Arc<PanelClient>,
    config: SessionConfig,
    args: ReorderArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        ReorderCommand::Pattern { user, pattern } => {
            let user = util::parse_user(&user)?;
            util::Session::oneshot(client, config, user, |s| {
                reorder_user(s, Strategy::Pattern(pattern), global)
            })
            .await
        }

        ReorderCommand::Quality { user, window } => {
            let user = util::parse_user(&user)?;
            let window = util::check_window(window)?;
            util::Session::oneshot(client, config, user, |s| {
                reorder_user(s, Strategy::Quality(window), global)
            })
            .await
        }

        ReorderCommand::BulkPattern { users, pattern } => {
            reorder_bulk(client, &users, BulkStrategy::Pattern { pattern }, global).await
        }

        ReorderCommand::BulkQuality { users, window } => {
            let window_minutes =
                util::check_window(window)?.unwrap_or(config.quality_window_minutes);
            reorder_bulk(
                client,
                &users,
                BulkStrategy::Quality { window_minutes },
                global,
            )
            .await
        }
    }
}
