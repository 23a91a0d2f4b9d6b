//! Command dispatch: bridges CLI args -> session operations -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod keys;
pub mod reorder;
pub mod util;

use std::sync::Arc;

use crate::cli::{Command, GlobalOpts};
use crate::config;
use crate::error::CliError;

/// Dispatch a panel-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let client = Arc::new(oneui_core::connect(&resolved.panel)?);
    tracing::debug!(
        profile = %resolved.profile,
        panel = %resolved.panel.url,
        "connected"
    );
    let session = resolved.session;

    match cmd {
        Command::Keys(args) => keys::handle(client, session, args, global).await,
        Command::Devices(args) => devices::handle(client, session, args, global).await,
        Command::Reorder(args) => reorder::handle(client, session, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
