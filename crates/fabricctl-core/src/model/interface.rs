// ── Interface payload helpers ──
//
// A unit payload as returned by `GET /interface` and accepted by
// `PUT /interface`:
//
//   { "policy": "int_trunk_host",
//     "interfaces": [ { "ifName": "...", "serialNumber": "...",
//                       "nvPairs": { "DESC": "...", "CONF": "...", ... } } ] }
//
// Only predicates and the verifier use these; the pipeline treats the
// payload as opaque.

use serde_json::{Map, Value};

pub const DESC: &str = "DESC";
pub const CONF: &str = "CONF";
pub const CDP_ENABLE: &str = "CDP_ENABLE";
pub const PRIORITY: &str = "PRIORITY";
pub const POLICY_ID: &str = "POLICY_ID";
pub const FABRIC_NAME: &str = "FABRIC_NAME";

/// Build a single-interface payload.
pub fn unit_payload(policy: &str, if_name: &str, serial: &str, nv_pairs: Map<String, Value>) -> Value {
    serde_json::json!({
        "policy": policy,
        "interfaces": [{
            "ifName": if_name,
            "serialNumber": serial,
            "nvPairs": Value::Object(nv_pairs),
        }],
    })
}

pub fn policy_name(payload: &Value) -> Option<&str> {
    payload.get("policy").and_then(Value::as_str)
}

fn nv_pairs(payload: &Value) -> Option<&Map<String, Value>> {
    payload
        .get("interfaces")?
        .get(0)?
        .get("nvPairs")?
        .as_object()
}

fn nv_pairs_mut(payload: &mut Value) -> Option<&mut Map<String, Value>> {
    payload
        .get_mut("interfaces")?
        .get_mut(0)?
        .get_mut("nvPairs")?
        .as_object_mut()
}

/// Read one string field of the interface's `nvPairs`.
pub fn nv_pair<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    nv_pairs(payload)?.get(key)?.as_str()
}

/// Set one `nvPairs` field. Returns `false` if the payload has no
/// `nvPairs` object to write into.
pub fn set_nv_pair(payload: &mut Value, key: &str, value: impl Into<String>) -> bool {
    match nv_pairs_mut(payload) {
        Some(pairs) => {
            pairs.insert(key.to_owned(), Value::String(value.into()));
            true
        }
        None => false,
    }
}

/// Append a line to the freeform `CONF` block, newline-joined.
pub fn append_conf_line(payload: &mut Value, line: &str) -> bool {
    let current = nv_pair(payload, CONF).unwrap_or_default();
    let next = if current.trim().is_empty() {
        line.to_owned()
    } else {
        format!("{current}\n{line}")
    };
    set_nv_pair(payload, CONF, next)
}

/// `true` for `mgmt0` and friends.
pub fn is_mgmt(unit_name: &str) -> bool {
    unit_name.to_ascii_lowercase().starts_with("mgmt")
}

pub fn is_ethernet(unit_name: &str) -> bool {
    unit_name.to_ascii_lowercase().starts_with("ethernet")
}
