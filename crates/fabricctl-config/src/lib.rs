//! Shared configuration for fabricctl.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to `fabricctl_core::ControllerConfig` / `RunOptions`. The
//! CLI layers its flag overrides on top of what this crate resolves.

use std::collections::BTreeMap;
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

use fabricctl_api::RetryPolicy;
use fabricctl_core::{ControllerConfig, RunOptions, TlsVerification};

/// Keyring service all fabricctl secrets are stored under.
pub const KEYRING_SERVICE: &str = "fabricctl";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

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

    #[serde(default)]
    pub defaults: Defaults,

    /// Named controller profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());
        self.profiles
            .get(&name)
            .map(|p| (name.clone(), p))
            .ok_or(ConfigError::UnknownProfile { profile: name })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub insecure: bool,

    /// Seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            insecure: false,
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_read_timeout() -> u64 {
    60
}

/// A named controller profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Controller base URL (e.g., "https://10.0.0.5").
    pub controller: String,

    pub username: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    pub connect_timeout: Option<u64>,
    pub read_timeout: Option<u64>,

    /// Upper bound on retries per call.
    pub retries: Option<u32>,
    /// Backoff factor in milliseconds.
    pub backoff_ms: Option<u64>,

    pub login_attempts: Option<u32>,

    /// Seconds allowed for one deploy request.
    pub deploy_timeout: Option<u64>,
    /// Seconds between status polls.
    pub status_interval: Option<u64>,
    /// Seconds to wait for switches to converge.
    pub status_timeout: Option<u64>,
    pub desired_status: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "fabricctl", "fabricctl").map_or_else(
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
    p.push("fabricctl");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` merged with `FABRICCTL_*` variables. Nested keys use a
/// double underscore: `FABRICCTL_DEFAULTS__OUTPUT=json`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FABRICCTL_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/password"),
    )?)
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(password)?;
    Ok(())
}

/// Resolve the username: profile, then `FABRICCTL_USERNAME`.
pub fn resolve_username(profile: &Profile, profile_name: &str) -> Result<String, ConfigError> {
    profile
        .username
        .clone()
        .or_else(|| std::env::var("FABRICCTL_USERNAME").ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })
}

/// Resolve the password from the credential chain (no CLI flag step).
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env, then the generic variable
    let env_names = profile
        .password_env
        .iter()
        .map(String::as_str)
        .chain(["FABRICCTL_PASSWORD"]);
    for name in env_names {
        if let Ok(val) = std::env::var(name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(pw) = keyring_entry(profile_name).and_then(|e| e.get_password().map_err(ConfigError::from)) {
        return Ok(SecretString::from(pw));
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `ControllerConfig` from a profile, without CLI overrides.
///
/// `password` is taken as given when supplied, so callers can skip the
/// credential chain (e.g. after prompting).
pub fn profile_to_controller_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    password: Option<SecretString>,
) -> Result<ControllerConfig, ConfigError> {
    let url: url::Url = profile
        .controller
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "controller".into(),
            reason: format!("invalid URL: {}", profile.controller),
        })?;

    let username = resolve_username(profile, profile_name)?;
    let password = match password {
        Some(pw) => pw,
        None => resolve_password(profile, profile_name)?,
    };

    let mut config = ControllerConfig::new(url, username, password);
    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };
    config.connect_timeout =
        Duration::from_secs(profile.connect_timeout.unwrap_or(defaults.connect_timeout));
    config.read_timeout =
        Duration::from_secs(profile.read_timeout.unwrap_or(defaults.read_timeout));

    let mut retry = RetryPolicy::default();
    if let Some(total) = profile.retries {
        retry.total = total;
    }
    if let Some(ms) = profile.backoff_ms {
        retry.backoff_factor = Duration::from_millis(ms);
    }
    config.retry = retry;
    if let Some(attempts) = profile.login_attempts {
        config.login_attempts = attempts.max(1);
    }
    Ok(config)
}

/// Pipeline options from a profile, defaults elsewhere.
pub fn profile_run_options(profile: &Profile) -> RunOptions {
    let mut options = RunOptions::default();
    if let Some(secs) = profile.deploy_timeout {
        options.deploy_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.status_interval {
        options.status_interval = Duration::from_secs(secs.max(1));
    }
    if let Some(secs) = profile.status_timeout {
        options.status_timeout = Duration::from_secs(secs);
    }
    if let Some(status) = &profile.desired_status {
        options.desired_status.clone_from(status);
    }
    options
}
