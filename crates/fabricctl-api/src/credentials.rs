// Login credentials and the re-prompt hook used when the controller
// rejects them.

use secrecy::SecretString;

use crate::error::Error;

/// Username and password for `POST /logon`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

/// Supplies fresh credentials after the controller rejected the last pair.
///
/// `attempt` is the 1-based login attempt about to be made. The binary
/// implements this with a terminal prompt; anything non-interactive can use
/// [`NoPrompt`].
pub trait CredentialSource: Send + Sync {
    fn credentials(&self, attempt: u32) -> Result<Credentials, Error>;
}

/// A source that never re-prompts, so a rejected login fails immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl CredentialSource for NoPrompt {
    fn credentials(&self, _attempt: u32) -> Result<Credentials, Error> {
        Err(Error::Authentication {
            message: "credentials rejected and no interactive prompt available".into(),
        })
    }
}
