//! Clap derive structures for the `fabricctl` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fabricctl -- change automation for fabric controllers
#[derive(Debug, Parser)]
#[command(
    name = "fabricctl",
    version,
    about = "Apply, deploy and roll back interface changes on a fabric controller",
    long_about = "Discovers switches and interface configuration, computes changes from a set \
        of rules, pushes and deploys them, waits for the fabric to converge and verifies \
        what was written. Every apply can be undone from its snapshot file.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Controller profile to use
    #[arg(long, short = 'p', env = "FABRICCTL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Controller URL (overrides profile)
    #[arg(long, short = 'c', env = "FABRICCTL_CONTROLLER", global = true)]
    pub controller: Option<String>,

    /// Login user (overrides profile)
    #[arg(long, short = 'u', env = "FABRICCTL_USERNAME", global = true)]
    pub username: Option<String>,

    /// Output format
    #[arg(long, short = 'o', env = "FABRICCTL_OUTPUT", default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Also write a plaintext log to this file
    #[arg(long, env = "FABRICCTL_LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Level for the log file
    #[arg(long, default_value = "debug", global = true)]
    pub log_file_level: String,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "FABRICCTL_INSECURE", global = true)]
    pub insecure: bool,

    /// Per-request read timeout (e.g. 60s, 2m)
    #[arg(long, value_parser = humantime::parse_duration, global = true)]
    pub request_timeout: Option<Duration>,

    /// Bound on login attempts when credentials are rejected
    #[arg(long, global = true)]
    pub login_attempts: Option<u32>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compute changes and (with --deploy) push, deploy and verify them
    Apply(ApplyArgs),

    /// Restore the configuration recorded in a snapshot file
    Rollback(RollbackArgs),

    /// List switches in the inventory
    #[command(alias = "sw")]
    Switches(SwitchesArgs),

    /// List switch policies
    #[command(alias = "pol")]
    Policies(PoliciesArgs),

    /// Show switch status, optionally waiting for a target status
    Status(StatusArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared selection ─────────────────────────────────────────────────

/// Which switches a command works on.
#[derive(Debug, Args)]
#[command(group(ArgGroup::new("selection").required(true).args(["serials", "serials_file", "all"])))]
pub struct SwitchSelection {
    /// Comma-separated switch serial numbers
    #[arg(long, short = 's', value_delimiter = ',')]
    pub serials: Vec<String>,

    /// File with one serial number per line
    #[arg(long)]
    pub serials_file: Option<PathBuf>,

    /// Every switch the controller manages
    #[arg(long)]
    pub all: bool,
}

/// Like [`SwitchSelection`], but defaulting to all switches.
#[derive(Debug, Args)]
pub struct OptionalSelection {
    /// Comma-separated switch serial numbers (default: all)
    #[arg(long, short = 's', value_delimiter = ',')]
    pub serials: Vec<String>,

    /// File with one serial number per line
    #[arg(long, conflicts_with = "serials")]
    pub serials_file: Option<PathBuf>,
}

/// Deploy and wait tuning shared by apply and rollback.
#[derive(Debug, Args)]
pub struct DeployOpts {
    /// Send changes to the controller (otherwise a dry run)
    #[arg(long)]
    pub deploy: bool,

    /// Deploy whole switches instead of the changed interfaces
    #[arg(long)]
    pub switch_deploy: bool,

    /// How long to wait for switches to reach the desired status
    /// (status polling only; see --deploy-timeout)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// HTTP timeout for each deploy request
    #[arg(long, value_parser = humantime::parse_duration)]
    pub deploy_timeout: Option<Duration>,

    /// Time between status polls
    #[arg(long, value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,

    /// Status that counts as converged
    #[arg(long)]
    pub desired_status: Option<String>,

    /// Do not wait for switch status after deploying
    #[arg(long)]
    pub no_wait: bool,

    /// Do not re-read and compare pushed interfaces
    #[arg(long)]
    pub no_verify: bool,
}

// ── Apply ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub selection: SwitchSelection,

    /// Change rules to run (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    pub plugins: Vec<String>,

    /// Desired interface descriptions (YAML or JSON list)
    #[arg(long)]
    pub desired: Option<PathBuf>,

    /// Pattern lifting `interface` / `description` pairs out of switch
    /// freeform policies when no --desired file is given
    #[arg(long, default_value = crate::patterns::FREEFORM_DESCRIPTION)]
    pub freeform_pattern: String,

    /// Only change descriptions on leaf switches
    #[arg(long)]
    pub leaf_only_descriptions: bool,

    /// Uplink ranges per switch model (YAML mapping)
    #[arg(long)]
    pub uplinks: Option<PathBuf>,

    /// Also disable CDP on management interfaces
    #[arg(long)]
    pub mgmt: bool,

    /// Where to write the rollback snapshot
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    #[command(flatten)]
    pub deploy: DeployOpts,
}

// ── Rollback ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RollbackArgs {
    /// Snapshot file written by `apply`
    #[arg(long, required = true)]
    pub snapshot: PathBuf,

    #[command(flatten)]
    pub deploy: DeployOpts,
}

// ── Read-only views ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SwitchesArgs {
    #[command(flatten)]
    pub selection: OptionalSelection,

    /// Look up VPC peers
    #[arg(long)]
    pub peers: bool,

    /// Fill hardware model and host name from fabric inventory
    #[arg(long)]
    pub details: bool,
}

#[derive(Debug, Args)]
pub struct PoliciesArgs {
    #[command(flatten)]
    pub selection: OptionalSelection,

    /// Template name pattern (repeatable, any may match)
    #[arg(long)]
    pub template: Vec<String>,

    /// Description pattern
    #[arg(long)]
    pub description: Vec<String>,

    /// Entity name pattern
    #[arg(long)]
    pub entity_name: Vec<String>,

    /// Entity type pattern
    #[arg(long)]
    pub entity_type: Vec<String>,

    /// Generated config pattern
    #[arg(long)]
    pub config: Vec<String>,

    /// Only policies on switches in this fabric
    #[arg(long)]
    pub fabric: Option<String>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub selection: OptionalSelection,

    /// Wait until every selected switch reports this status
    #[arg(long)]
    pub wait_for: Option<String>,

    /// Give up waiting after this long
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5m")]
    pub timeout: Duration,

    /// Time between polls
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    pub interval: Duration,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive profile setup
    Init,

    /// Show the resolved configuration (secrets redacted)
    Show,

    /// Print the config file path
    Path,

    /// Store a profile's password in the system keyring
    SetPassword,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
