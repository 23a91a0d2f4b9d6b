//! Shared configuration for One-UI tools.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), pattern
//! policy tables, and translation to `oneui_core::SessionConfig`. The CLI
//! builds the `PanelConfig` itself since flags override profile values.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use oneui_core::config::{DEFAULT_WINDOW_MINUTES, MAX_WINDOW_MINUTES};
use oneui_core::priority::{DEFAULT_PRIORITY_BASE, validate_priority};
use oneui_core::{PatternPolicy, PollInterval, PresenceConfig, ProfileRule, SessionConfig};

/// Keyring service name for stored tokens.
pub const KEYRING_SERVICE: &str = "oneui";

/// Prefix of environment overrides (`ONEUI_DEFAULTS__TIMEOUT=10`).
pub const ENV_PREFIX: &str = "ONEUI_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named panel profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,

    /// Pattern policies by name, on top of the built-in `myanmar`.
    #[serde(default)]
    pub patterns: BTreeMap<String, PatternTable>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
            patterns: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Pick a profile: the explicit name, else `default_profile`, else
    /// `"default"`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());
        self.profiles
            .get(&name)
            .map(|p| (name.clone(), p))
            .ok_or(ConfigError::UnknownProfile { name })
    }

    /// Built-in policies overlaid with the configured ones. A configured
    /// policy replaces a built-in one of the same name.
    pub fn pattern_policies(&self) -> Vec<PatternPolicy> {
        let mut policies = vec![PatternPolicy::myanmar()];
        for (name, table) in &self.patterns {
            let name = name.to_lowercase();
            let policy = PatternPolicy {
                name: name.clone(),
                profiles: table.profiles.clone(),
            };
            match policies.iter_mut().find(|p| p.name == name) {
                Some(existing) => *existing = policy,
                None => policies.push(policy),
            }
        }
        policies
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub poll_interval: PollInterval,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            poll_interval: PollInterval::default(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named panel profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Panel base URL (e.g., "https://vpn.example.com:9290").
    pub panel: String,

    /// Admin token (plaintext, prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable name containing the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Background refresh of relations and telemetry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<PollInterval>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_window_minutes: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_window_minutes: Option<u32>,

    /// First priority handed out by manual reorders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_priority: Option<i32>,

    /// Prefer the live presence stream over polling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_presence: Option<bool>,
}

/// `[patterns.<name>]` table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PatternTable {
    #[serde(default)]
    pub profiles: Vec<ProfileRule>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "oneui", "oneui").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("oneui");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment. A missing file yields the
/// defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

fn keyring_account(profile_name: &str) -> String {
    format!("{profile_name}/token")
}

/// Resolve the admin token: `token_env` variable, then system keyring,
/// then plaintext in the profile.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_token_with(
        profile,
        profile_name,
        |var| std::env::var(var).ok(),
        |account| {
            keyring::Entry::new(KEYRING_SERVICE, account)
                .and_then(|entry| entry.get_password())
                .ok()
        },
    )
}

/// [`resolve_token`] with injectable env and keyring lookups.
pub fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(value) = profile.token_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(value));
    }

    // 2. System keyring
    if let Some(secret) = keyring(&keyring_account(profile_name)) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a token for `profile_name` in the system keyring.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &keyring_account(profile_name))
        .and_then(|entry| entry.set_password(token))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── Translation to core config ──────────────────────────────────────

/// Parse and check a panel base URL.
pub fn parse_panel_url(raw: &str) -> Result<url::Url, ConfigError> {
    let url: url::Url = raw.parse().map_err(|_| ConfigError::Validation {
        field: "panel".into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "panel".into(),
            reason: format!("expected an http(s) URL, got '{raw}'"),
        });
    }
    Ok(url)
}

/// Build a `SessionConfig` from a profile and the global tables.
pub fn profile_to_session_config(
    profile: &Profile,
    config: &Config,
) -> Result<SessionConfig, ConfigError> {
    let telemetry_window_minutes = window(
        "telemetry_window_minutes",
        profile.telemetry_window_minutes,
    )?;
    let quality_window_minutes = window("quality_window_minutes", profile.quality_window_minutes)?;
    let priority_base = validate_priority(profile.base_priority.unwrap_or(DEFAULT_PRIORITY_BASE))
        .map_err(|e| ConfigError::Validation {
            field: "base_priority".into(),
            reason: e.to_string(),
        })?;

    let poll_interval = profile
        .poll_interval
        .unwrap_or(config.defaults.poll_interval);
    let mut presence = PresenceConfig {
        live: profile.live_presence.unwrap_or(true),
        ..PresenceConfig::default()
    };
    if let Some(period) = poll_interval.period() {
        presence.poll_interval = period;
    }

    Ok(SessionConfig {
        poll_interval,
        telemetry_window_minutes,
        quality_window_minutes,
        priority_base,
        presence,
        patterns: config.pattern_policies(),
    })
}

fn window(field: &str, value: Option<u32>) -> Result<u32, ConfigError> {
    let minutes = value.unwrap_or(DEFAULT_WINDOW_MINUTES);
    if (1..=MAX_WINDOW_MINUTES).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(ConfigError::Validation {
            field: field.into(),
            reason: format!("{minutes} is outside 1..={MAX_WINDOW_MINUTES}"),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "sg"

[defaults]
output = "json"
poll_interval = "30s"

[profiles.sg]
panel = "https://vpn.example.com:9290"
token = "plain-token"
token_env = "SG_PANEL_TOKEN"
quality_window_minutes = 120
base_priority = 10
live_presence = false

[patterns.Fallback]
profiles = [ { protocol = "shadowsocks" } ]

[patterns.myanmar]
profiles = [ { security = "reality" } ]
"#;

    fn sample() -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        load_config_from(&path).unwrap()
    }

    #[test]
    fn loads_profiles_and_defaults() {
        let cfg = sample();
        assert_eq!(cfg.defaults.output, "json");
        assert_eq!(cfg.defaults.timeout, 30);

        let (name, profile) = cfg.profile(None).unwrap();
        assert_eq!(name, "sg");
        assert_eq!(profile.panel, "https://vpn.example.com:9290");
        assert!(matches!(
            cfg.profile(Some("missing")),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn session_config_takes_profile_overrides() {
        let cfg = sample();
        let (_, profile) = cfg.profile(None).unwrap();
        let session = profile_to_session_config(profile, &cfg).unwrap();

        assert_eq!(session.poll_interval, PollInterval::ThirtySeconds);
        assert_eq!(session.presence.poll_interval, Duration::from_secs(30));
        assert!(!session.presence.live);
        assert_eq!(session.quality_window_minutes, 120);
        assert_eq!(session.telemetry_window_minutes, DEFAULT_WINDOW_MINUTES);
        assert_eq!(session.priority_base, 10);
    }

    #[test]
    fn configured_patterns_override_builtin() {
        let cfg = sample();
        let policies = cfg.pattern_policies();
        let names: Vec<&str> = policies.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["myanmar", "fallback"]);
        assert_eq!(policies[0].profiles.len(), 1);
    }

    #[test]
    fn out_of_range_window_is_rejected() {
        let cfg = Config::default();
        let profile = Profile {
            panel: "https://p".into(),
            telemetry_window_minutes: Some(0),
            ..Profile::default()
        };
        assert!(matches!(
            profile_to_session_config(&profile, &cfg),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn token_chain_prefers_env_then_keyring_then_plaintext() {
        let profile = Profile {
            panel: "https://p".into(),
            token: Some("plain".into()),
            token_env: Some("TOKEN_VAR".into()),
            ..Profile::default()
        };

        let from_env = resolve_token_with(
            &profile,
            "p",
            |_| Some("env".into()),
            |_| Some("keyring".into()),
        )
        .unwrap();
        assert_eq!(from_env.expose_secret(), "env");

        let from_keyring =
            resolve_token_with(&profile, "p", |_| None, |_| Some("keyring".into())).unwrap();
        assert_eq!(from_keyring.expose_secret(), "keyring");

        let plain = resolve_token_with(&profile, "p", |_| None, |_| None).unwrap();
        assert_eq!(plain.expose_secret(), "plain");

        let bare = Profile::default();
        assert!(matches!(
            resolve_token_with(&bare, "p", |_| None, |_| None),
            Err(ConfigError::NoCredentials { .. })
        ));
    }

    #[test]
    fn panel_url_must_be_http() {
        assert!(parse_panel_url("https://vpn.example.com").is_ok());
        assert!(parse_panel_url("ftp://vpn.example.com").is_err());
        assert!(parse_panel_url("not a url").is_err());
    }

    #[test]
    fn save_then_load_keeps_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                panel: "https://vpn.example.com".into(),
                poll_interval: Some(PollInterval::Manual),
                ..Profile::default()
            },
        );
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        let (_, profile) = loaded.profile(None).unwrap();
        assert_eq!(profile.poll_interval, Some(PollInterval::Manual));
    }
}
