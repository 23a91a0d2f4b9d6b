//! Clap derive structures for the `oneui` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// oneui -- access-key presence and priority for One-UI panels
#[derive(Debug, Parser)]
#[command(
    name = "oneui",
    version,
    about = "Inspect and reorder One-UI access keys from the command line",
    long_about = "Operator tool for the One-UI VPN panel.\n\n\
        Shows which of a user's access keys are online, reorders key\n\
        priorities by hand, by pattern or by connection quality, and\n\
        revokes devices. Every reorder is previewed as a dry run first.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Panel profile to use
    #[arg(long, short = 'p', env = "ONEUI_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Panel URL (overrides profile)
    #[arg(long, env = "ONEUI_PANEL", global = true)]
    pub panel: Option<String>,

    /// Admin token (overrides profile)
    #[arg(long, env = "ONEUI_TOKEN", global = true, hide_env = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "ONEUI_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "ONEUI_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "ONEUI_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect and edit a user's access keys
    #[command(alias = "k")]
    Keys(KeysArgs),

    /// Inspect and revoke a user's devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Reorder key priorities by pattern or connection quality
    #[command(alias = "ro")]
    Reorder(ReorderArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  KEYS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KeyFilterArg {
    All,
    Enabled,
    Disabled,
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KeySortArg {
    Key,
    Protocol,
    Port,
    Priority,
    Enabled,
    Online,
    Expiration,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WatchInterval {
    #[value(name = "5s")]
    FiveSeconds,
    #[value(name = "10s")]
    TenSeconds,
    #[value(name = "30s")]
    ThirtySeconds,
}

/// Filter and sort flags shared by `keys list` and `keys watch`.
#[derive(Debug, Args)]
pub struct ViewArgs {
    /// Only show matching keys
    #[arg(long, short = 'f', default_value = "all")]
    pub filter: KeyFilterArg,

    /// Sort column
    #[arg(long, short = 's', default_value = "priority")]
    pub sort: KeySortArg,

    /// Sort descending
    #[arg(long)]
    pub desc: bool,
}

#[derive(Debug, Subcommand)]
pub enum KeysCommand {
    /// List a user's access keys with presence
    #[command(alias = "ls")]
    List {
        /// User ID
        user: String,

        #[command(flatten)]
        view: ViewArgs,

        /// Mark keys matching this pattern policy
        #[arg(long)]
        pattern: Option<String>,
    },

    /// Keep refreshing a user's key table until interrupted
    Watch {
        /// User ID
        user: String,

        #[command(flatten)]
        view: ViewArgs,

        /// Refresh period
        #[arg(long, short = 'i', default_value = "10s")]
        interval: WatchInterval,
    },

    /// Move a key to the position of another (drag and drop)
    #[command(alias = "mv")]
    Move {
        /// User ID
        user: String,

        /// Inbound ID of the key to move
        source: i64,

        /// Inbound ID of the key whose position it takes
        target: i64,
    },

    /// Enable or disable one key
    Toggle {
        /// User ID
        user: String,

        /// Inbound ID
        inbound: i64,

        /// Enable the key
        #[arg(long, conflicts_with = "disable", required_unless_present = "disable")]
        enable: bool,

        /// Disable the key
        #[arg(long)]
        disable: bool,
    },

    /// Set one key's priority (1-9999, lower is tried first)
    Priority {
        /// User ID
        user: String,

        /// Inbound ID
        inbound: i64,

        /// New priority
        priority: i32,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List devices seen on a user's keys
    #[command(alias = "ls")]
    List {
        /// User ID
        user: String,

        /// Look-back window in minutes (1-10080)
        #[arg(long, short = 'w')]
        window: Option<u32>,
    },

    /// Revoke a device so it must reconnect
    Revoke {
        /// User ID
        user: String,

        /// Device fingerprint
        fingerprint: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  REORDER
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ReorderArgs {
    #[command(subcommand)]
    pub command: ReorderCommand,
}

#[derive(Debug, Subcommand)]
pub enum ReorderCommand {
    /// Move keys matching a pattern policy to the top
    Pattern {
        /// User ID
        user: String,

        /// Pattern policy name
        #[arg(long, default_value = "myanmar")]
        pattern: String,
    },

    /// Order keys by recent connection quality
    Quality {
        /// User ID
        user: String,

        /// Scoring window in minutes (1-10080, default from profile)
        #[arg(long, short = 'w')]
        window: Option<u32>,
    },

    /// Pattern reorder across many users
    BulkPattern {
        /// Comma-separated user IDs
        #[arg(long, value_delimiter = ',', required = true)]
        users: Vec<String>,

        /// Pattern policy name
        #[arg(long, default_value = "myanmar")]
        pattern: String,
    },

    /// Quality reorder across many users
    BulkQuality {
        /// Comma-separated user IDs
        #[arg(long, value_delimiter = ',', required = true)]
        users: Vec<String>,

        /// Scoring window in minutes (1-10080, default from profile)
        #[arg(long, short = 'w')]
        window: Option<u32>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// Store an admin token in the system keyring
    SetToken {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
