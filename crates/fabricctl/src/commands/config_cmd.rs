//! Config subcommand handlers.

use dialoguer::{Confirm, Input, Select};
use serde::Serialize;

use fabricctl_config::{Profile, store_password};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// A profile as shown by `config show`, secrets redacted.
#[derive(Debug, Serialize)]
struct ShownProfile<'a> {
    name: &'a str,
    default: bool,
    #[serde(flatten)]
    profile: Profile,
}

fn redacted(profile: &Profile) -> Profile {
    let mut shown = profile.clone();
    if shown.password.is_some() {
        shown.password = Some("********".into());
    }
    shown
}

fn show_detail(profiles: &[ShownProfile<'_>]) -> String {
    if profiles.is_empty() {
        return "No profiles configured. Run: fabricctl config init".into();
    }
    profiles
        .iter()
        .map(|p| {
            let marker = if p.default { " (default)" } else { "" };
            let user = p.profile.username.as_deref().unwrap_or("-");
            format!("{}{marker}\n  controller: {}\n  username:   {user}", p.name, p.profile.controller)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = config::config_path();
            eprintln!("fabricctl configuration");
            eprintln!("   Config path: {}\n", config_path.display());

            let mut cfg = config::load_config().unwrap_or_default();

            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default(global.profile.clone().unwrap_or_else(|| "default".into()))
                .interact_text()
                .map_err(prompt_err)?;

            let controller: String = Input::new()
                .with_prompt("Controller URL")
                .default("https://10.0.0.5".into())
                .interact_text()
                .map_err(prompt_err)?;
            url::Url::parse(&controller)
                .map_err(|e| CliError::validation("controller", format!("invalid URL: {e}")))?;

            let username: String = Input::new()
                .with_prompt("Username")
                .default("admin".into())
                .interact_text()
                .map_err(prompt_err)?;

            let password = rpassword::prompt_password("Password: ").map_err(prompt_err)?;
            let store_choices = &[
                "Store in system keyring (recommended)",
                "Save to config file (plaintext)",
                "Do not store (prompt every run)",
            ];
            let store_selection = Select::new()
                .with_prompt("Where to store the password?")
                .items(store_choices)
                .default(0)
                .interact()
                .map_err(prompt_err)?;

            let plaintext = match store_selection {
                0 if !password.is_empty() => {
                    store_password(&profile_name, &password)?;
                    eprintln!("   Password stored in system keyring");
                    None
                }
                1 => Some(password),
                _ => None,
            };

            let insecure = Confirm::new()
                .with_prompt("Accept self-signed certificates?")
                .default(true)
                .interact()
                .map_err(prompt_err)?;

            let profile = Profile {
                controller,
                username: Some(username),
                password: plaintext,
                insecure: Some(insecure),
                ..Profile::default()
            };
            cfg.profiles.insert(profile_name.clone(), profile);
            if cfg.default_profile.is_none() || cfg.profiles.len() == 1 {
                cfg.default_profile = Some(profile_name.clone());
            }
            config::save_config(&cfg)?;

            eprintln!("\nConfiguration written to {}", config_path.display());
            eprintln!("  Profile: {profile_name}");
            eprintln!("\n  Test it: fabricctl switches --profile {profile_name}");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            let default = config::active_profile_name(global, &cfg);
            let shown: Vec<ShownProfile<'_>> = cfg
                .profiles
                .iter()
                .map(|(name, profile)| ShownProfile {
                    name,
                    default: *name == default,
                    profile: redacted(profile),
                })
                .collect();
            let out = output::render_single(&global.output, &shown, |p| show_detail(p), |p| {
                p.iter().map(|s| s.name.to_owned()).collect::<Vec<_>>().join("\n")
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        // ── Set-password ────────────────────────────────────────────
        ConfigCommand::SetPassword => {
            let cfg = config::load_config_or_default();
            let name = config::active_profile_name(global, &cfg);
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    name,
                    available: config::available(&cfg),
                });
            }
            let password =
                rpassword::prompt_password(format!("Password for profile '{name}': "))?;
            if password.is_empty() {
                return Err(CliError::validation("password", "password cannot be empty"));
            }
            store_password(&name, &password)?;
            eprintln!("Password for '{name}' stored in system keyring");
            Ok(())
        }
    }
}
