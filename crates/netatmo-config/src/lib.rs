//! Configuration for netatmo-core consumers.
//!
//! TOML profiles merged with `NETATMO_` environment overrides, credential
//! resolution (env + keyring + plaintext), and translation to
//! `netatmo_core::NetatmoConfig`. The file is only ever read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use netatmo_core::{AuthCredentials, DEFAULT_API_URL, NetatmoConfig, TlsVerification};

/// Keyring service name; entries are keyed `<profile>/<secret>`.
const KEYRING_SERVICE: &str = "netatmo";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("unknown profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
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
    /// Profile used when none is named explicitly.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Resolve a profile (`name`, else `default_profile`, else `"default"`)
    /// into a runtime config.
    pub fn netatmo_config(&self, name: Option<&str>) -> Result<NetatmoConfig, ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })?;
        profile_to_config(profile, name, &self.defaults)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Monitor polling cycle in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    540
}

/// A named account profile.
#[derive(Debug, Deserialize, Serialize)]
pub struct Profile {
    /// API root; production when unset.
    pub api_url: Option<String>,

    /// OAuth2 app client id from the developer portal.
    pub client_id: Option<String>,

    /// Client secret (plaintext — prefer keyring or env var).
    pub client_secret: Option<String>,

    /// Environment variable name containing the client secret.
    pub client_secret_env: Option<String>,

    /// Grant to sign in with: "password" or "refresh_token". Authorization
    /// codes are single-use and have no place in a stored profile.
    #[serde(default = "default_auth_mode")]
    pub auth_mode: String,

    /// Account username for the password grant.
    pub username: Option<String>,

    /// Account password (plaintext — prefer keyring).
    pub password: Option<String>,

    /// Refresh token (plaintext — prefer keyring or env var).
    pub refresh_token: Option<String>,

    /// Environment variable name containing the refresh token.
    pub refresh_token_env: Option<String>,

    /// Space-separated OAuth2 scopes.
    pub scope: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS verification.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Override polling cycle.
    pub poll_interval: Option<u64>,
}

fn default_auth_mode() -> String {
    "password".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "netatmo-rs", "netatmo-rs").map_or_else(
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
    p.push("netatmo-rs");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the platform config file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from `path` + environment. A missing file is not an error.
///
/// Environment keys nest with `__`, e.g.
/// `NETATMO_PROFILES__HOME__CLIENT_ID=...`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NETATMO_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve one secret: named env var → keyring → plaintext.
fn resolve_secret(
    env_name: Option<&str>,
    profile_name: &str,
    keyring_key: &str,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    // 1. Env var
    if let Some(val) = env_name.and_then(|name| std::env::var(name).ok()) {
        return Some(SecretString::from(val));
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{keyring_key}")) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    plaintext.map(|s| SecretString::from(s.to_owned()))
}

/// Resolve the app's client secret.
pub fn resolve_client_secret(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    resolve_secret(
        profile.client_secret_env.as_deref(),
        profile_name,
        "client-secret",
        profile.client_secret.as_deref(),
    )
    .ok_or_else(|| ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Resolve account credentials (username + password).
pub fn resolve_password_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<(String, SecretString), ConfigError> {
    let no_credentials = || ConfigError::NoCredentials {
        profile: profile_name.into(),
    };

    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var("NETATMO_USERNAME").ok())
        .ok_or_else(no_credentials)?;

    let password = resolve_secret(
        Some("NETATMO_PASSWORD"),
        profile_name,
        "password",
        profile.password.as_deref(),
    )
    .ok_or_else(no_credentials)?;

    Ok((username, password))
}

/// Resolve a stored refresh token.
pub fn resolve_refresh_token(
    profile: &Profile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    resolve_secret(
        profile.refresh_token_env.as_deref(),
        profile_name,
        "refresh-token",
        profile.refresh_token.as_deref(),
    )
    .ok_or_else(|| ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Resolve `AuthCredentials` from a profile's `auth_mode` field.
pub fn resolve_auth(profile: &Profile, profile_name: &str) -> Result<AuthCredentials, ConfigError> {
    match profile.auth_mode.as_str() {
        "password" => {
            let (username, password) = resolve_password_credentials(profile, profile_name)?;
            Ok(AuthCredentials::Password { username, password })
        }
        "refresh_token" => Ok(AuthCredentials::RefreshToken(resolve_refresh_token(
            profile,
            profile_name,
        )?)),
        "authorization_code" => Err(ConfigError::Validation {
            field: "auth_mode".into(),
            reason: "authorization codes are single-use; store the refresh token instead".into(),
        }),
        other => Err(ConfigError::Validation {
            field: "auth_mode".into(),
            reason: format!("expected 'password' or 'refresh_token', got '{other}'"),
        }),
    }
}

/// Build a `NetatmoConfig` from a profile, falling back to `defaults`.
pub fn profile_to_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<NetatmoConfig, ConfigError> {
    let raw_url = profile.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
    let url: url::Url = raw_url.parse().map_err(|_| ConfigError::Validation {
        field: "api_url".into(),
        reason: format!("invalid URL: {raw_url}"),
    })?;

    let client_id = profile
        .client_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ConfigError::Validation {
            field: "client_id".into(),
            reason: "missing".into(),
        })?;
    let client_secret = resolve_client_secret(profile, profile_name)?;
    let auth = resolve_auth(profile, profile_name)?;

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let poll_interval = profile.poll_interval.unwrap_or(defaults.poll_interval);
    if poll_interval == 0 {
        return Err(ConfigError::Validation {
            field: "poll_interval".into(),
            reason: "must be at least 1 second".into(),
        });
    }

    Ok(NetatmoConfig {
        url,
        client_id,
        client_secret,
        auth,
        scope: profile.scope.clone(),
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        poll_interval: Duration::from_secs(poll_interval),
    })
}
