//! CLI configuration: a thin layer over `fabricctl_config`.
//!
//! Resolves the active profile and applies `GlobalOpts` flag overrides
//! (--controller, --username, --insecure, ...).

use fabricctl_config::ConfigError;
use fabricctl_core::{ControllerConfig, RunOptions, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::prompt;

pub use fabricctl_config::{
    Config, Profile, config_path, load_config, load_config_or_default, profile_run_options,
    profile_to_controller_config, save_config,
};

/// Everything a controller-bound command needs before connecting.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub controller: ControllerConfig,
    pub options: RunOptions,
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    match load_config() {
        Ok(cfg) => Ok(cfg),
        // A broken file is only fatal when the user asked for a profile.
        Err(e) if global.profile.is_some() => Err(e.into()),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable config file");
            Ok(Config::default())
        }
    }
}

/// Build a `ControllerConfig` from the config file, profile and flags.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load(global)?;
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available(&cfg),
            });
        }
        None => Profile::default(),
    };

    // Flags win over the profile
    if let Some(url) = &global.controller {
        profile.controller.clone_from(url);
    }
    if let Some(user) = &global.username {
        profile.username = Some(user.clone());
    }
    if profile.controller.is_empty() {
        return Err(CliError::NoConfig {
            path: config_path().display().to_string(),
        });
    }

    let mut controller =
        match profile_to_controller_config(&profile, &profile_name, &cfg.defaults, None) {
            Ok(config) => config,
            // Username known but no password anywhere: ask once.
            Err(ConfigError::NoCredentials { .. }) if profile.username.is_some() => {
                let username = profile.username.as_deref().unwrap_or_default();
                let password = prompt::read_password(username)?;
                profile_to_controller_config(&profile, &profile_name, &cfg.defaults, Some(password))?
            }
            Err(e) => return Err(e.into()),
        };

    if global.insecure {
        controller.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(timeout) = global.request_timeout {
        controller.read_timeout = timeout;
    }
    if let Some(attempts) = global.login_attempts {
        controller.login_attempts = attempts.max(1);
    }

    Ok(Resolved {
        options: profile_run_options(&profile),
        profile_name,
        controller,
    })
}

pub fn available(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
