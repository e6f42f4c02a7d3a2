//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::fmt::Write as _;
use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use fabricctl_core::model::interface;
use fabricctl_core::verify::{self, FieldMismatch};
use fabricctl_core::{
    ChangeSet, PolicyRecord, RunReport, Snapshot, SwitchRecord, UnitKey, VpcPeer, WaitOutcome,
};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

fn good(text: &str, color: bool) -> String {
    if color {
        text.green().to_string()
    } else {
        text.to_owned()
    }
}

fn bad(text: &str, color: bool) -> String {
    if color {
        text.red().bold().to_string()
    } else {
        text.to_owned()
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable items in the chosen format.
///
/// - `table`: `to_row` builds one `Tabled` row per item
/// - `json` / `json-compact` / `yaml`: serializes the original data
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single item. Table and plain use pre-formatted text.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn or_dash(value: Option<&str>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or("-").to_owned()
}

// ── Switches ─────────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct SwitchRow {
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Fabric")]
    fabric: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "VPC Peer")]
    peer: String,
}

pub fn switch_row(s: &SwitchRecord) -> SwitchRow {
    SwitchRow {
        serial: s.serial_number.clone(),
        name: or_dash(s.name.as_deref()),
        role: s.role.to_string(),
        fabric: s.fabric_name.clone(),
        model: or_dash(s.model.as_deref()),
        peer: match &s.peer {
            VpcPeer::Unchecked => "?".into(),
            VpcPeer::Unpaired => "-".into(),
            VpcPeer::Paired(serial) => serial.clone(),
        },
    }
}

// ── Policies ─────────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct PolicyRow {
    #[tabled(rename = "Policy")]
    id: String,
    #[tabled(rename = "Switch")]
    serial: String,
    #[tabled(rename = "Template")]
    template: String,
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub fn policy_row(p: &PolicyRecord) -> PolicyRow {
    PolicyRow {
        id: p.policy_id.clone(),
        serial: p.serial_number.clone(),
        template: or_dash(p.template_name.as_deref()),
        entity: match (&p.entity_type, &p.entity_name) {
            (Some(kind), Some(name)) => format!("{kind}:{name}"),
            (kind, name) => or_dash(kind.as_deref().or(name.as_deref())),
        },
        description: or_dash(p.description.as_deref()),
    }
}

// ── Status ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SwitchStatus {
    pub serial_number: String,
    pub fabric_name: String,
    pub status: String,
}

#[derive(Tabled)]
pub struct StatusRow {
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Fabric")]
    fabric: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub fn status_row(s: &SwitchStatus) -> StatusRow {
    StatusRow {
        serial: s.serial_number.clone(),
        fabric: s.fabric_name.clone(),
        status: s.status.clone(),
    }
}

// ── Planned changes ──────────────────────────────────────────────────

/// One planned unit change with the fields it touches.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedChange {
    pub unit: UnitKey,
    pub policy: Option<String>,
    pub fields: Vec<FieldMismatch>,
}

/// Pair each change with its snapshot entry and list the differing fields.
pub fn planned_changes(changes: &ChangeSet, snapshot: &Snapshot) -> Vec<PlannedChange> {
    changes
        .iter()
        .map(|(key, payload)| PlannedChange {
            unit: key.clone(),
            policy: interface::policy_name(payload).map(str::to_owned),
            fields: snapshot
                .get(key)
                .map(|before| verify::diff_fields(payload, before))
                .unwrap_or_default(),
        })
        .collect()
}

#[derive(Tabled)]
pub struct ChangeRow {
    #[tabled(rename = "Interface")]
    unit: String,
    #[tabled(rename = "Switch")]
    serial: String,
    #[tabled(rename = "Policy")]
    policy: String,
    #[tabled(rename = "Change")]
    change: String,
}

fn short(value: Option<&serde_json::Value>) -> String {
    match value {
        None => "∅".into(),
        Some(serde_json::Value::String(s)) => format!("{s:?}"),
        Some(other) => other.to_string(),
    }
}

pub fn change_row(c: &PlannedChange) -> ChangeRow {
    let change = c
        .fields
        .iter()
        .map(|f| {
            let field = f.pointer.rsplit('/').next().unwrap_or(&f.pointer);
            format!("{field}: {} → {}", short(f.observed.as_ref()), short(f.expected.as_ref()))
        })
        .collect::<Vec<_>>()
        .join("\n");
    ChangeRow {
        unit: c.unit.unit_name.clone(),
        serial: c.unit.serial_number.clone(),
        policy: or_dash(c.policy.as_deref()),
        change,
    }
}

// ── Run report ───────────────────────────────────────────────────────

fn count_line(out: &mut String, stage: &str, ok: usize, failed: usize, color: bool) {
    let failed_text = format!("{failed} failed");
    let failed_text = if failed > 0 {
        bad(&failed_text, color)
    } else {
        failed_text
    };
    let _ = writeln!(out, "  {stage:<20} {} ok, {failed_text}", good(&ok.to_string(), color));
}

/// Human summary of a run, failures listed by key.
pub fn report_detail(report: &RunReport, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Run {} → {}",
        report.started_at.format("%H:%M:%S"),
        report.finished_at.format("%H:%M:%S")
    );
    if !report.deleted_policies.is_empty() {
        count_line(
            &mut out,
            "policies deleted",
            report.deleted_policies.success().len(),
            report.deleted_policies.failure().len(),
            color,
        );
    }
    if !report.recreated_policies.is_empty() {
        count_line(
            &mut out,
            "policies recreated",
            report.recreated_policies.success().len(),
            report.recreated_policies.failure().len(),
            color,
        );
    }
    count_line(
        &mut out,
        "interfaces pushed",
        report.push.success().len(),
        report.push.failure().len(),
        color,
    );
    count_line(
        &mut out,
        "switches deployed",
        report.deploy.outcome.success().len(),
        report.deploy.outcome.failure().len(),
        color,
    );
    match &report.wait {
        Some(WaitOutcome::Reached) => {
            let _ = writeln!(out, "  {:<20} {}", "status", good("reached", color));
        }
        Some(WaitOutcome::TimedOut(pending)) => {
            let _ = writeln!(
                out,
                "  {:<20} {}",
                "status",
                bad(&format!("timed out, {} pending", pending.len()), color)
            );
        }
        None => {}
    }
    if let Some(verify) = &report.verify {
        count_line(
            &mut out,
            "verified",
            verify.outcome.success().len(),
            verify.outcome.failure().len(),
            color,
        );
    }
    if report.cancelled {
        let _ = writeln!(out, "  {:<20} {}", "run", bad("interrupted", color));
    }

    let units = report.failed_units();
    let serials = report.failed_serials();
    let policies = report.failed_policies();
    if !units.is_empty() {
        let _ = writeln!(out, "\n{}", bad("Failed interfaces:", color));
        for unit in &units {
            let _ = writeln!(out, "  {unit}");
        }
    }
    if !serials.is_empty() {
        let _ = writeln!(out, "\n{}", bad("Failed switches:", color));
        for serial in &serials {
            let status = match &report.wait {
                Some(WaitOutcome::TimedOut(pending)) => pending.get(serial).map(String::as_str),
                _ => None,
            };
            match status {
                Some(status) => {
                    let _ = writeln!(out, "  {serial} ({status})");
                }
                None => {
                    let _ = writeln!(out, "  {serial}");
                }
            }
        }
    }
    if !policies.is_empty() {
        let _ = writeln!(out, "\n{}", bad("Failed policies:", color));
        for id in &policies {
            let _ = writeln!(out, "  {id}");
        }
    }
    out.trim_end().to_owned()
}

/// Plain listing of every failed key, one per line.
pub fn report_failures(report: &RunReport) -> String {
    report
        .failed_units()
        .iter()
        .map(ToString::to_string)
        .chain(report.failed_serials())
        .chain(report.failed_policies())
        .collect::<Vec<_>>()
        .join("\n")
}
