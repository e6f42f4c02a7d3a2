// ── Change sets and snapshots ──

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::policy::PolicyRecord;
use super::unit::UnitKey;

/// Intended new payload per unit for one run.
///
/// Built by the diff engine and not modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(with = "entries")]
    units: BTreeMap<UnitKey, Value>,
}

impl ChangeSet {
    pub(crate) fn from_units(units: BTreeMap<UnitKey, Value>) -> Self {
        Self { units }
    }

    /// Replay a snapshot's original payloads as a new change set.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            units: snapshot.units.clone(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UnitKey, &Value)> {
        self.units.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &UnitKey> {
        self.units.keys()
    }

    pub fn get(&self, key: &UnitKey) -> Option<&Value> {
        self.units.get(key)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Serial numbers touched by this change set.
    pub fn serials(&self) -> BTreeSet<String> {
        self.units.keys().map(|k| k.serial_number.clone()).collect()
    }
}

/// Pre-change payloads captured alongside a [`ChangeSet`], plus the
/// policies that run deleted. Persisted by the caller for rollback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(with = "entries")]
    units: BTreeMap<UnitKey, Value>,
    #[serde(default)]
    superseded_policies: Vec<PolicyRecord>,
}

impl Snapshot {
    pub(crate) fn new(units: BTreeMap<UnitKey, Value>, superseded_policies: Vec<PolicyRecord>) -> Self {
        Self {
            units,
            superseded_policies,
        }
    }

    pub fn get(&self, key: &UnitKey) -> Option<&Value> {
        self.units.get(key)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.superseded_policies.is_empty()
    }

    pub fn superseded_policies(&self) -> &[PolicyRecord] {
        &self.superseded_policies
    }

    /// Every switch the snapshot touches, units and policies alike.
    pub fn serials(&self) -> BTreeSet<String> {
        self.units
            .keys()
            .map(|k| k.serial_number.clone())
            .chain(self.superseded_policies.iter().map(|p| p.serial_number.clone()))
            .collect()
    }
}

/// Serialize a unit map as a list of entries, since JSON object keys
/// must be strings.
mod entries {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    use crate::model::UnitKey;

    #[derive(Serialize)]
    struct EntryRef<'a> {
        unit_name: &'a str,
        serial_number: &'a str,
        payload: &'a Value,
    }

    #[derive(Deserialize)]
    struct Entry {
        unit_name: String,
        serial_number: String,
        payload: Value,
    }

    pub fn serialize<S: Serializer>(
        units: &BTreeMap<UnitKey, Value>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(units.iter().map(|(key, payload)| EntryRef {
            unit_name: &key.unit_name,
            serial_number: &key.serial_number,
            payload,
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<UnitKey, Value>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        let mut units = BTreeMap::new();
        for entry in entries {
            let key = UnitKey::new(entry.unit_name, entry.serial_number);
            if units.insert(key.clone(), entry.payload).is_some() {
                return Err(serde::de::Error::custom(format!("duplicate unit {key}")));
            }
        }
        Ok(units)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn snapshot_file_shape_is_stable() {
        let mut units = BTreeMap::new();
        units.insert(UnitKey::new("Ethernet1/2", "SN1"), json!({"policy": "b"}));
        units.insert(UnitKey::new("Ethernet1/1", "SN1"), json!({"policy": "a"}));
        let snapshot = Snapshot::new(units, Vec::new());

        let text = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(
            text,
            r#"{"units":[{"unit_name":"Ethernet1/1","serial_number":"SN1","payload":{"policy":"a"}},{"unit_name":"Ethernet1/2","serial_number":"SN1","payload":{"policy":"b"}}],"superseded_policies":[]}"#
        );
        let back: Snapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(ChangeSet::from_snapshot(&back).len(), 2);
    }

    #[test]
    fn duplicate_entries_are_rejected() {
        let text = r#"{"units":[
            {"unit_name":"Ethernet1/1","serial_number":"SN1","payload":{}},
            {"unit_name":"Ethernet1/1","serial_number":"SN1","payload":{}}]}"#;
        assert!(serde_json::from_str::<Snapshot>(text).is_err());
    }
}
