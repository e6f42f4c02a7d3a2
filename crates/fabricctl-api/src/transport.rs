// Transport configuration for the controller HTTP client.
//
// TLS mode, timeouts, and the retry budget live here so the session only
// deals with tokens and response classification.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Method;

use crate::error::Error;

/// TLS verification mode.
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (controllers usually ship self-signed).
    DangerAcceptInvalid,
}

/// Bounded retry budget applied beneath every session call.
///
/// Connect failures are retried for every method since nothing reached the
/// controller. Read failures and retryable status codes are only retried for
/// idempotent methods, so a POST is never sent twice by this layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Upper bound on retries of any kind for one call.
    pub total: u32,
    pub connect: u32,
    pub read: u32,
    pub status: u32,
    /// Base of the exponential backoff.
    pub backoff_factor: Duration,
    /// Status codes that trigger a retry.
    pub status_forcelist: Vec<u16>,
}

/// Cap on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(120);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            total: 10,
            connect: 3,
            read: 3,
            status: 3,
            backoff_factor: Duration::from_millis(300),
            status_forcelist: vec![413, 429, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            total: 0,
            connect: 0,
            read: 0,
            status: 0,
            ..Self::default()
        }
    }

    /// Sleep before retry number `retry` (1-based): `factor * 2^(retry-1)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.backoff_factor
            .saturating_mul(1_u32 << exp)
            .min(MAX_BACKOFF)
    }

    /// Whether `status` is in the retry list.
    pub fn retries_status(&self, status: u16) -> bool {
        self.status_forcelist.contains(&status)
    }
}

/// Which retry budget a failed attempt draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryKind {
    Connect,
    Read,
    Status,
}

/// Retries spent so far on one call.
#[derive(Debug, Default)]
pub(crate) struct RetryCounts {
    pub(crate) total: u32,
    connect: u32,
    read: u32,
    status: u32,
}

impl RetryCounts {
    /// Spend one retry of `kind` if both its own and the total budget allow it.
    pub(crate) fn take(&mut self, policy: &RetryPolicy, kind: RetryKind) -> bool {
        if self.total >= policy.total {
            return false;
        }
        let (used, limit) = match kind {
            RetryKind::Connect => (&mut self.connect, policy.connect),
            RetryKind::Read => (&mut self.read, policy.read),
            RetryKind::Status => (&mut self.status, policy.status),
        };
        if *used >= limit {
            return false;
        }
        *used += 1;
        self.total += 1;
        true
    }
}

/// Whether repeating `method` is safe once the request may have been seen.
pub(crate) fn is_idempotent(method: &Method) -> bool {
    [
        Method::GET,
        Method::HEAD,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ]
    .contains(method)
}

/// Transport configuration for building the session's HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Bound on establishing a TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Default bound on a whole request once connected. Individual requests
    /// may override it.
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// The read timeout is not baked in; the session applies it per request.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(concat!("fabricctl/", env!("CARGO_PKG_VERSION")));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}
