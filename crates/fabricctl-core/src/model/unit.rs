// ── Configuration units ──

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Composite identity of a configuration unit: an interface name plus the
/// switch that owns it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub unit_name: String,
    pub serial_number: String,
}

impl UnitKey {
    pub fn new(unit_name: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            unit_name: unit_name.into(),
            serial_number: serial_number.into(),
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.unit_name, self.serial_number)
    }
}

/// The atomic thing the pipeline changes.
///
/// `payload` is controller JSON; only change predicates interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUnit {
    pub key: UnitKey,
    pub policy_id: Option<String>,
    pub payload: Value,
}

impl ConfigUnit {
    pub fn new(key: UnitKey, policy_id: Option<String>, payload: Value) -> Self {
        Self {
            key,
            policy_id,
            payload,
        }
    }

    pub fn serial_number(&self) -> &str {
        &self.key.serial_number
    }

    pub fn unit_name(&self) -> &str {
        &self.key.unit_name
    }
}
