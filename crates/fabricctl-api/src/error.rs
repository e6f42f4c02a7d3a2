use serde_json::Value;
use thiserror::Error;

/// Top-level error type for the `fabricctl-api` crate.
///
/// Every failure a [`Session`](crate::Session) call can produce lands in one
/// of these variants. `fabricctl-core` maps them one-to-one into its own
/// error type so callers can still branch on the kind.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// Connect timeout, connection refused, or any other transport failure
    /// left after the retry budget is spent.
    #[error("Connection error on {method} {url}: {reason}")]
    Connection {
        method: String,
        url: String,
        reason: String,
    },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected, login budget exhausted, or no session established.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The controller rejected the session token (HTTP 401).
    ///
    /// `Session::request` recovers from this once by logging in again.
    #[error("Unauthorized access to {method} {path}")]
    Unauthorized { method: String, path: String },

    // ── Controller ──────────────────────────────────────────────────
    /// Any other 4xx/5xx answer, with the decoded body for inspection.
    #[error("Controller returned HTTP {status} for {method} {path}: {message}")]
    ServerResponse {
        status: u16,
        method: String,
        path: String,
        message: String,
        body: Value,
    },

    // ── Caller misuse ───────────────────────────────────────────────
    #[error("Invalid parameter: {0}")]
    Parameter(String),

    // ── Data ────────────────────────────────────────────────────────
    /// A response did not have the shape the caller needed.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error should end the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::Tls(_))
    }

    /// Returns `true` for transport failures that a later call may not hit.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::ServerResponse { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// The HTTP status behind this error, if the controller answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServerResponse { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }
}
