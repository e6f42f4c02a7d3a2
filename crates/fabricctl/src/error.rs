//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text and distinct exit codes.

use miette::Diagnostic;
use thiserror::Error;

use fabricctl_config::ConfigError;
use fabricctl_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const CONSISTENCY: i32 = 9;
    pub const PARTIAL: i32 = 10;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the controller ({target})")]
    #[diagnostic(
        code(fabricctl::connection_failed),
        help(
            "{reason}\n\
             Check the controller URL and network path.\n\
             For a self-signed certificate use --insecure (-k) or set ca_cert in the profile."
        )
    )]
    ConnectionFailed { target: String, reason: String },

    #[error("No switch status returned for fabric(s): {fabrics}")]
    #[diagnostic(
        code(fabricctl::status_unavailable),
        help("The controller answered but reported nothing for these fabrics. Try again later.")
    )]
    StatusUnavailable { fabrics: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(fabricctl::auth_failed),
        help(
            "{message}\n\
             Verify the username and password, then store the password with:\n\
             fabricctl config set-password --profile <name>"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(fabricctl::no_credentials),
        help(
            "Configure credentials with: fabricctl config init\n\
             Or set FABRICCTL_USERNAME and FABRICCTL_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Controller ───────────────────────────────────────────────────
    #[error("Controller rejected {method} {path} (HTTP {status}): {message}")]
    #[diagnostic(code(fabricctl::controller))]
    Controller {
        status: u16,
        method: String,
        path: String,
        message: String,
    },

    #[error("Unexpected data from the controller: {message}")]
    #[diagnostic(code(fabricctl::unexpected_data))]
    UnexpectedData { message: String },

    // ── Pipeline ─────────────────────────────────────────────────────
    #[error("Superseded policies were deleted but their replacement push failed")]
    #[diagnostic(
        code(fabricctl::policy_consistency),
        help(
            "Deleted policies: {policies}\n\
             Failed units: {units}\n\
             Nothing was deployed. Reconcile these switches by hand or run\n\
             fabricctl rollback --snapshot <file> --deploy"
        )
    )]
    PolicyConsistency { policies: String, units: String },

    #[error("Rule '{predicate}' could not start: {message}")]
    #[diagnostic(
        code(fabricctl::predicate),
        help("desc needs --desired or switch freeform policies; orphan-port needs --uplinks.")
    )]
    Predicate { predicate: String, message: String },

    #[error("Run finished with failures")]
    #[diagnostic(code(fabricctl::partial_failure), help("{summary}"))]
    PartialFailure { summary: String },

    #[error("Switches did not reach the desired status in time")]
    #[diagnostic(code(fabricctl::timeout), help("Still pending: {pending}"))]
    Timeout { pending: String },

    #[error("Interrupted")]
    #[diagnostic(code(fabricctl::interrupted))]
    Cancelled,

    // ── Input files ──────────────────────────────────────────────────
    #[error("Invalid snapshot: {reason}")]
    #[diagnostic(
        code(fabricctl::snapshot),
        help("Snapshot files are written by `fabricctl apply`; pass one unmodified.")
    )]
    Snapshot { reason: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fabricctl::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(fabricctl::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: fabricctl config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No controller configured")]
    #[diagnostic(
        code(fabricctl::no_config),
        help(
            "Create a profile with: fabricctl config init\n\
             Or pass --controller. Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(fabricctl::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(fabricctl::json))]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML: {0}")]
    #[diagnostic(code(fabricctl::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::StatusUnavailable { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::PolicyConsistency { .. } => exit_code::CONSISTENCY,
            Self::PartialFailure { .. } => exit_code::PARTIAL,
            Self::Cancelled => exit_code::INTERRUPTED,
            Self::Validation { .. }
            | Self::Predicate { .. }
            | Self::Snapshot { .. }
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Connection {
                method,
                url,
                reason,
            } => CliError::ConnectionFailed {
                target: format!("{method} {url}").trim().to_owned(),
                reason,
            },

            CoreError::Authentication { message } => CliError::AuthFailed { message },

            CoreError::Unauthorized { method, path } => CliError::AuthFailed {
                message: format!("the controller refused {method} {path}"),
            },

            CoreError::ServerResponse {
                status,
                method,
                path,
                message,
                body: _,
            } => CliError::Controller {
                status,
                method,
                path,
                message,
            },

            CoreError::Parameter { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Deserialization { message } => CliError::UnexpectedData { message },

            CoreError::PolicyConsistency {
                deleted_policies,
                failed_units,
            } => CliError::PolicyConsistency {
                policies: deleted_policies.join(", "),
                units: failed_units
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            },

            CoreError::StatusUnavailable { fabrics } => CliError::StatusUnavailable {
                fabrics: fabrics.join(", "),
            },

            CoreError::PredicateInit { predicate, message } => {
                CliError::Predicate { predicate, message }
            }

            CoreError::Cancelled => CliError::Cancelled,

            CoreError::Snapshot { message } => CliError::Snapshot { reason: message },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}

impl From<fabricctl_api::Error> for CliError {
    fn from(err: fabricctl_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
