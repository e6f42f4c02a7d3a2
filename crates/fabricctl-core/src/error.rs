// ── Core error types ──
//
// Errors surfaced by the orchestration pipeline. Session failures keep
// their kind on the way up: the `From<fabricctl_api::Error>` impl maps
// variant to variant so callers can still branch on connection vs.
// authentication vs. controller rejection.

use serde_json::Value;
use thiserror::Error;

use crate::model::UnitKey;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session errors (kind-preserving) ─────────────────────────────
    #[error("Cannot reach controller ({method} {url}): {reason}")]
    Connection {
        method: String,
        url: String,
        reason: String,
    },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Unauthorized access to {method} {path}")]
    Unauthorized { method: String, path: String },

    #[error("Controller rejected {method} {path} (HTTP {status}): {message}")]
    ServerResponse {
        status: u16,
        method: String,
        path: String,
        message: String,
        body: Value,
    },

    #[error("Invalid parameter: {message}")]
    Parameter { message: String },

    #[error("Unexpected controller data: {message}")]
    Deserialization { message: String },

    // ── Pipeline errors ──────────────────────────────────────────────
    /// Superseded policies were deleted but the replacement push failed.
    /// The controller is left without either version for these units.
    #[error(
        "Policy replacement incomplete: {} superseded policy record(s) deleted but {} unit(s) failed to push",
        deleted_policies.len(),
        failed_units.len()
    )]
    PolicyConsistency {
        deleted_policies: Vec<String>,
        failed_units: Vec<UnitKey>,
    },

    #[error("Controller returned no switch status for fabric(s): {}", fabrics.join(", "))]
    StatusUnavailable { fabrics: Vec<String> },

    #[error("Predicate '{predicate}' failed to initialize: {message}")]
    PredicateInit { predicate: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid snapshot: {message}")]
    Snapshot { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// `true` if nothing further can be sent to the controller this run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::Cancelled)
    }

    pub(crate) fn parameter(message: impl Into<String>) -> Self {
        Self::Parameter {
            message: message.into(),
        }
    }
}

// ── Conversion from session errors ───────────────────────────────────

impl From<fabricctl_api::Error> for CoreError {
    fn from(err: fabricctl_api::Error) -> Self {
        match err {
            fabricctl_api::Error::Connection {
                method,
                url,
                reason,
            } => CoreError::Connection {
                method,
                url,
                reason,
            },
            fabricctl_api::Error::Tls(reason) => CoreError::Connection {
                method: String::new(),
                url: String::new(),
                reason: format!("TLS error: {reason}"),
            },
            fabricctl_api::Error::Authentication { message } => {
                CoreError::Authentication { message }
            }
            fabricctl_api::Error::Unauthorized { method, path } => {
                CoreError::Unauthorized { method, path }
            }
            fabricctl_api::Error::ServerResponse {
                status,
                method,
                path,
                message,
                body,
            } => CoreError::ServerResponse {
                status,
                method,
                path,
                message,
                body,
            },
            fabricctl_api::Error::Parameter(message) => CoreError::Parameter { message },
            fabricctl_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            fabricctl_api::Error::Deserialization { message, body: _ } => {
                CoreError::Deserialization { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_kinds_survive_conversion() {
        let auth: CoreError = fabricctl_api::Error::Authentication {
            message: "nope".into(),
        }
        .into();
        assert!(matches!(auth, CoreError::Authentication { .. }));
        assert!(auth.is_fatal());

        let server: CoreError = fabricctl_api::Error::ServerResponse {
            status: 500,
            method: "PUT".into(),
            path: "/interface".into(),
            message: "RETURN_CODE: 500".into(),
            body: Value::Null,
        }
        .into();
        assert!(matches!(server, CoreError::ServerResponse { status: 500, .. }));
        assert!(!server.is_fatal());

        let param: CoreError = fabricctl_api::Error::Parameter("bad path".into()).into();
        assert!(matches!(param, CoreError::Parameter { .. }));
    }
}
