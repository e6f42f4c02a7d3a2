// ── Post-push verification ──
//
// Re-reads the units of a change set and compares them field by field
// with what was pushed. Fields the controller rewrites on every push are
// left out of the comparison.

use std::collections::BTreeMap;

use fabricctl_api::Session;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cancel::or_cancelled;
use crate::error::CoreError;
use crate::inventory::Inventory;
use crate::matcher::UnitFilter;
use crate::model::interface::{FABRIC_NAME, PRIORITY};
use crate::model::{ChangeSet, OutcomeSet, UnitKey};
use crate::policy_store::PolicyStore;

/// Fields ignored at any depth.
pub const EXCLUDED_FIELDS: [&str; 2] = [PRIORITY, FABRIC_NAME];

/// One differing field, addressed by JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMismatch {
    pub pointer: String,
    pub expected: Option<Value>,
    pub observed: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub outcome: OutcomeSet<UnitKey>,
    pub mismatches: BTreeMap<UnitKey, Vec<FieldMismatch>>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.outcome.is_clean()
    }
}

/// Fetch the current payload of every unit in `changes` and compare.
/// The re-read is abandoned with [`CoreError::Cancelled`] once `cancel`
/// fires.
pub async fn verify(
    session: &Session,
    inventory: &Inventory,
    changes: &ChangeSet,
    cancel: &CancellationToken,
) -> Result<VerifyReport, CoreError> {
    if changes.is_empty() {
        return Ok(VerifyReport::default());
    }
    info!(units = changes.len(), "verifying pushed changes");
    let mut store = PolicyStore::new();
    let serials = changes.serials();
    let filter = UnitFilter::new();
    let fetch = store.fetch_units(session, inventory, Some(&serials), &filter);
    or_cancelled(cancel, fetch).await?;
    let current: BTreeMap<UnitKey, Value> = store
        .units()
        .into_iter()
        .map(|u| (u.key, u.payload))
        .collect();
    Ok(compare(changes, &current))
}

/// Compare intended payloads with observed ones. A unit missing from
/// `current` fails verification.
pub fn compare(changes: &ChangeSet, current: &BTreeMap<UnitKey, Value>) -> VerifyReport {
    let mut report = VerifyReport::default();
    for (key, expected) in changes.iter() {
        let diffs = match current.get(key) {
            Some(observed) => diff_fields(expected, observed),
            None => vec![FieldMismatch {
                pointer: String::new(),
                expected: Some(expected.clone()),
                observed: None,
            }],
        };
        if diffs.is_empty() {
            report.outcome.record_success(key.clone());
        } else {
            warn!(unit = %key, fields = diffs.len(), "verification mismatch");
            report.outcome.record_failure(key.clone());
            report.mismatches.insert(key.clone(), diffs);
        }
    }
    report
}

/// Differing fields between two payloads, excluded fields left out.
pub fn diff_fields(expected: &Value, observed: &Value) -> Vec<FieldMismatch> {
    diff(&strip(expected), &strip(observed))
}

fn strip(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !EXCLUDED_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), strip(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip).collect()),
        other => other.clone(),
    }
}

fn diff(expected: &Value, observed: &Value) -> Vec<FieldMismatch> {
    let mut out = Vec::new();
    walk(String::new(), Some(expected), Some(observed), &mut out);
    out
}

fn walk(pointer: String, expected: Option<&Value>, observed: Option<&Value>, out: &mut Vec<FieldMismatch>) {
    match (expected, observed) {
        (Some(Value::Object(a)), Some(Value::Object(b))) => {
            let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let child = format!("{pointer}/{}", escape(key));
                walk(child, a.get(key), b.get(key), out);
            }
        }
        (Some(Value::Array(a)), Some(Value::Array(b))) => {
            for i in 0..a.len().max(b.len()) {
                walk(format!("{pointer}/{i}"), a.get(i), b.get(i), out);
            }
        }
        (a, b) if a == b => {}
        (a, b) => out.push(FieldMismatch {
            pointer,
            expected: a.cloned(),
            observed: b.cloned(),
        }),
    }
}

/// RFC 6901 token escaping.
fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
