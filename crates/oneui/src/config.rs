//! CLI configuration: thin wrapper around `oneui_config` shared types.
//!
//! Adds CLI-specific resolution that respects `GlobalOpts` flag
//! overrides (--panel, --token, --insecure, --timeout).

use std::time::Duration;

use secrecy::SecretString;

use oneui_core::{PanelConfig, SessionConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use oneui_config::{
    Config, Profile, config_path, load_config, load_config_or_default, save_config,
};

/// Everything a panel-bound command needs.
pub struct Resolved {
    pub profile: String,
    pub panel: PanelConfig,
    pub session: SessionConfig,
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Load the config file and merge in flag overrides.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load_config()?;
    resolve_with(global, &cfg)
}

pub fn resolve_with(global: &GlobalOpts, cfg: &Config) -> Result<Resolved, CliError> {
    let profile_name = active_profile_name(global, cfg);

    if let Some(profile) = cfg.profiles.get(&profile_name) {
        let panel = resolve_profile(profile, &profile_name, global, cfg)?;
        let session = oneui_config::profile_to_session_config(profile, cfg)?;
        return Ok(Resolved {
            profile: profile_name,
            panel,
            session,
        });
    }

    if global.profile.is_some() {
        let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
        available.sort_unstable();
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: if available.is_empty() {
                "(none)".into()
            } else {
                available.join(", ")
            },
        });
    }

    // No profile: flags alone must describe the panel.
    let url_str = global.panel.as_deref().ok_or_else(|| CliError::NoConfig {
        path: config_path().display().to_string(),
    })?;
    let url = oneui_config::parse_panel_url(url_str)?;
    let token = global
        .token
        .clone()
        .map(SecretString::from)
        .ok_or_else(|| CliError::NoCredentials {
            profile: profile_name.clone(),
        })?;
    let tls = if global.insecure || cfg.defaults.insecure {
        TlsVerification::DangerAcceptInvalid
    } else {
        TlsVerification::SystemDefaults
    };

    Ok(Resolved {
        panel: PanelConfig {
            url,
            token,
            tls,
            timeout: Duration::from_secs(global.timeout.unwrap_or(cfg.defaults.timeout)),
        },
        session: oneui_config::profile_to_session_config(&Profile::default(), cfg)?,
        profile: profile_name,
    })
}

/// Translate a `Profile` + global flags into a `PanelConfig`.
///
/// CLI flag overrides take priority over profile values.
fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<PanelConfig, CliError> {
    // 1. Panel URL (flag > env > profile)
    let url = oneui_config::parse_panel_url(global.panel.as_deref().unwrap_or(&profile.panel))?;

    // 2. Token (flag > token_env > keyring > plaintext)
    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => oneui_config::resolve_token(profile, profile_name)?,
    };

    // 3. TLS verification
    let tls = if global.insecure || profile.insecure.unwrap_or(cfg.defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    // 4. Timeout
    let secs = global
        .timeout
        .or(profile.timeout)
        .unwrap_or(cfg.defaults.timeout);

    Ok(PanelConfig {
        url,
        token,
        tls,
        timeout: Duration::from_secs(secs),
    })
}
