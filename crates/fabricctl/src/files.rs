//! Input and output files: desired descriptions, uplink ranges, serial
//! lists and rollback snapshots.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use fabricctl_core::{Snapshot, UnitKey, UplinkTable};

use crate::error::CliError;

/// Snapshot envelope format version.
pub const SNAPSHOT_VERSION: u32 = 1;

// ── Desired descriptions ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DesiredEntry {
    interface: String,
    switch: String,
    description: String,
}

/// Load a YAML (or JSON) list of `{interface, switch, description}`.
///
/// The same unit listed twice with different descriptions is rejected.
pub fn read_desired(path: &Path) -> Result<BTreeMap<UnitKey, String>, CliError> {
    let text = std::fs::read_to_string(path)?;
    parse_desired(&text)
}

fn parse_desired(text: &str) -> Result<BTreeMap<UnitKey, String>, CliError> {
    let entries: Vec<DesiredEntry> = serde_yaml::from_str(text)?;
    let mut desired = BTreeMap::new();
    for entry in entries {
        let key = UnitKey::new(entry.interface.trim(), entry.switch.trim());
        match desired.get(&key) {
            Some(existing) if existing != &entry.description => {
                return Err(CliError::validation(
                    "desired",
                    format!("{key} listed with two descriptions: '{existing}' and '{}'", entry.description),
                ));
            }
            _ => {
                desired.insert(key, entry.description);
            }
        }
    }
    debug!(count = desired.len(), "desired descriptions loaded");
    Ok(desired)
}

// ── Uplinks ──────────────────────────────────────────────────────────

/// Load a YAML mapping of `model-substring: [first, last]`.
pub fn read_uplinks(path: &Path) -> Result<UplinkTable, CliError> {
    let text = std::fs::read_to_string(path)?;
    parse_uplinks(&text)
}

fn parse_uplinks(text: &str) -> Result<UplinkTable, CliError> {
    let ranges: BTreeMap<String, (String, String)> = serde_yaml::from_str(text)?;
    UplinkTable::from_ranges(&ranges).map_err(|e| CliError::validation("uplinks", e.to_string()))
}

// ── Serial lists ─────────────────────────────────────────────────────

/// One serial per line; commas also split, `#` starts a comment.
pub fn read_serials(path: &Path) -> Result<BTreeSet<String>, CliError> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_serials(&text))
}

fn parse_serials(text: &str) -> BTreeSet<String> {
    text.lines()
        .map(|line| line.split_once('#').map_or(line, |(head, _)| head))
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

// ── Snapshots ────────────────────────────────────────────────────────

/// What `apply` writes before touching the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub version: u32,
    pub controller: String,
    pub created_at: DateTime<Utc>,
    pub snapshot: Snapshot,
}

impl SnapshotFile {
    pub fn new(controller: impl Into<String>, snapshot: Snapshot) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            controller: controller.into(),
            created_at: Utc::now(),
            snapshot,
        }
    }

    pub fn read(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path)?;
        let file: Self = serde_json::from_str(&text).map_err(|e| CliError::Snapshot {
            reason: format!("{}: {e}", path.display()),
        })?;
        if file.version != SNAPSHOT_VERSION {
            return Err(CliError::Snapshot {
                reason: format!(
                    "{}: format version {} (expected {SNAPSHOT_VERSION})",
                    path.display(),
                    file.version
                ),
            });
        }
        Ok(file)
    }

    /// Write pretty JSON, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), CliError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), units = self.snapshot.len(), "snapshot written");
        Ok(())
    }
}

/// `snapshot-20261014T101500Z.json` in the working directory.
pub fn default_snapshot_name(now: DateTime<Utc>) -> String {
    format!("snapshot-{}.json", now.format("%Y%m%dT%H%M%SZ"))
}
