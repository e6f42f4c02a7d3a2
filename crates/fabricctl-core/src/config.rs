// ── Runtime connection configuration ──
//
// Describes how to reach one controller. Carries credentials and
// transport tuning but never touches disk: the binary resolves a profile
// into a `ControllerConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use fabricctl_api::{CredentialSource, RetryPolicy, Session, TlsMode, TransportConfig};
use secrecy::SecretString;
use tracing::info;
use url::Url;

use crate::error::CoreError;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification. Default, since controllers ship self-signed.
    #[default]
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

/// Configuration for connecting to a single controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Controller URL (e.g., `https://10.0.0.5`).
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    pub tls: TlsVerification,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
    /// Bound on login attempts when credentials are rejected.
    pub login_attempts: u32,
    /// Answer every mutating call with a synthetic success.
    pub dry_run: bool,
}

impl ControllerConfig {
    pub fn new(url: Url, username: impl Into<String>, password: SecretString) -> Self {
        let transport = TransportConfig::default();
        Self {
            url,
            username: username.into(),
            password,
            tls: TlsVerification::default(),
            connect_timeout: transport.connect_timeout,
            read_timeout: transport.read_timeout,
            retry: transport.retry,
            login_attempts: 3,
            dry_run: true,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            retry: self.retry.clone(),
        }
    }

    /// Build a session and log in. `prompt` supplies credentials after a
    /// rejection.
    pub async fn connect(
        &self,
        prompt: impl CredentialSource + 'static,
    ) -> Result<Session, CoreError> {
        let session = Session::new(self.url.clone(), &self.transport())?
            .with_dry_run(self.dry_run)
            .with_login_attempts(self.login_attempts)
            .with_credential_source(prompt);
        session.login(&self.username, &self.password).await?;
        info!(url = %self.url, dry_run = self.dry_run, "connected to controller");
        Ok(session)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn transport_carries_tuning() {
        let mut config = ControllerConfig::new(
            "https://10.0.0.5".parse().unwrap(),
            "admin",
            SecretString::from("pw".to_owned()),
        );
        config.tls = TlsVerification::CustomCa("/etc/ca.pem".into());
        config.read_timeout = Duration::from_secs(5);
        config.retry = RetryPolicy::none();

        let transport = config.transport();
        assert!(matches!(transport.tls, TlsMode::CustomCa(ref p) if p.ends_with("ca.pem")));
        assert_eq!(transport.read_timeout, Duration::from_secs(5));
        assert_eq!(transport.retry, RetryPolicy::none());
    }

    #[test]
    fn defaults_are_dry_run() {
        let config = ControllerConfig::new(
            "https://10.0.0.5".parse().unwrap(),
            "admin",
            SecretString::from(String::new()),
        );
        assert!(config.dry_run);
        assert_eq!(config.login_attempts, 3);
    }
}
