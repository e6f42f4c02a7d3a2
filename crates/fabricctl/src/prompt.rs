//! Terminal credential prompt used after the controller rejects a login.

use std::io::IsTerminal;

use dialoguer::Input;
use secrecy::SecretString;

use fabricctl_api::{CredentialSource, Credentials, Error};

#[derive(Debug, Clone)]
pub struct TerminalPrompt {
    default_username: String,
}

impl TerminalPrompt {
    pub fn new(default_username: impl Into<String>) -> Self {
        Self {
            default_username: default_username.into(),
        }
    }
}

fn prompt_failed(e: impl std::fmt::Display) -> Error {
    Error::Authentication {
        message: format!("credential prompt failed: {e}"),
    }
}

impl CredentialSource for TerminalPrompt {
    fn credentials(&self, attempt: u32) -> Result<Credentials, Error> {
        if !std::io::stdin().is_terminal() {
            return Err(Error::Authentication {
                message: "credentials rejected and stdin is not a terminal".into(),
            });
        }
        eprintln!("Login rejected (attempt {attempt}); enter credentials again.");
        let username: String = Input::new()
            .with_prompt("Username")
            .default(self.default_username.clone())
            .interact_text()
            .map_err(prompt_failed)?;
        let password = rpassword::prompt_password("Password: ").map_err(prompt_failed)?;
        Ok(Credentials::new(username, SecretString::from(password)))
    }
}

/// Ask for a password once, up front.
pub fn read_password(username: &str) -> Result<SecretString, crate::error::CliError> {
    if !std::io::stdin().is_terminal() {
        return Err(crate::error::CliError::AuthFailed {
            message: "no password configured and stdin is not a terminal".into(),
        });
    }
    let password = rpassword::prompt_password(format!("Password for {username}: "))?;
    Ok(SecretString::from(password))
}
