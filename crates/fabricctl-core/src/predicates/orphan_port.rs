// `vpc orphan-port suspend` on host-facing leaf ports that are not
// uplinks for the switch model.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use super::{ChangePredicate, PredicateContext, Scope, init_error};
use crate::error::CoreError;
use crate::model::ConfigUnit;
use crate::model::interface::{self, CONF};

pub(super) const NAME: &str = "orphan-port";

const ORPHAN_SUSPEND: &str = "vpc orphan-port suspend";
const HOST_POLICIES: [&str; 2] = ["int_trunk_host", "int_access_host"];

/// Uplink interfaces per switch model.
///
/// A table key matches any model string that contains it, so `93180YC`
/// covers `N9K-C93180YC-EX`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UplinkTable {
    models: BTreeMap<String, BTreeSet<String>>,
}

impl UplinkTable {
    /// Expand `model → [first, last]` ranges such as `["1/49", "1/54"]`
    /// into `Ethernet1/49` … `Ethernet1/54`.
    pub fn from_ranges(ranges: &BTreeMap<String, (String, String)>) -> Result<Self, CoreError> {
        let mut models = BTreeMap::new();
        for (model, (first, last)) in ranges {
            let (slot, start) = parse_port(first)
                .ok_or_else(|| CoreError::parameter(format!("bad uplink port '{first}' for {model}")))?;
            let (last_slot, end) = parse_port(last)
                .ok_or_else(|| CoreError::parameter(format!("bad uplink port '{last}' for {model}")))?;
            if slot != last_slot || start > end {
                return Err(CoreError::parameter(format!(
                    "uplink range {first}..{last} for {model} is not ascending within one slot"
                )));
            }
            let ports = (start..=end).map(|i| format!("Ethernet{slot}/{i}")).collect();
            models.insert(model.clone(), ports);
        }
        Ok(Self { models })
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Uplinks for a hardware model, if any table key matches.
    pub fn uplinks_for(&self, model: &str) -> Option<&BTreeSet<String>> {
        self.models
            .iter()
            .find(|(key, _)| model.contains(key.as_str()))
            .map(|(_, ports)| ports)
    }
}

/// `"1/49"` or `"Ethernet1/49"` → `("1", 49)`.
fn parse_port(text: &str) -> Option<(String, u32)> {
    let text = text.trim();
    let text = text
        .get(..8)
        .filter(|p| p.eq_ignore_ascii_case("ethernet"))
        .map_or(text, |_| &text[8..]);
    let (slot, port) = text.split_once('/')?;
    let port = port.parse().ok()?;
    slot.parse::<u32>().ok()?;
    Some((slot.to_owned(), port))
}

#[derive(Debug, Default)]
pub struct OrphanPortPredicate {
    uplinks: BTreeMap<String, BTreeSet<String>>,
}

impl ChangePredicate for OrphanPortPredicate {
    fn name(&self) -> &'static str {
        NAME
    }

    fn scope(&self) -> Scope {
        Scope::LeafOnly
    }

    fn initialize(&mut self, ctx: &PredicateContext<'_>) -> Result<(), CoreError> {
        let table = ctx
            .config
            .uplinks
            .as_ref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| init_error(NAME, "no uplink table supplied"))?;

        let mut uplinks = BTreeMap::new();
        for serial in ctx.inventory.leaf_serials() {
            let record = ctx.inventory.switch(&serial)?;
            let model = record
                .model
                .ok_or_else(|| init_error(NAME, format!("no model known for leaf {serial}")))?;
            let ports = table
                .uplinks_for(&model)
                .ok_or_else(|| init_error(NAME, format!("no uplink data for model {model}")))?;
            uplinks.insert(serial, ports.clone());
        }
        self.uplinks = uplinks;
        Ok(())
    }

    fn apply(&self, unit: &ConfigUnit, copy: &mut Value) -> bool {
        let name = unit.unit_name();
        let Some(uplinks) = self.uplinks.get(unit.serial_number()) else {
            return false;
        };

        let eligible = !interface::is_mgmt(name)
            && !uplinks.contains(name)
            && interface::policy_name(copy)
                .is_some_and(|p| HOST_POLICIES.iter().any(|h| p.contains(h)))
            && !interface::nv_pair(copy, CONF).is_some_and(|c| c.contains(ORPHAN_SUSPEND));
        if !eligible {
            return false;
        }
        debug!(unit = %unit.key, "appending '{ORPHAN_SUSPEND}'");
        interface::append_conf_line(copy, ORPHAN_SUSPEND)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Map, json};

    use super::*;
    use crate::inventory::Inventory;
    use crate::model::interface::unit_payload;
    use crate::model::{SwitchRecord, SwitchRole, UnitKey};
    use crate::policy_store::PolicyStore;
    use crate::predicates::PredicateConfig;

    fn table() -> UplinkTable {
        let mut ranges = BTreeMap::new();
        ranges.insert("93180YC".to_owned(), ("1/49".to_owned(), "1/54".to_owned()));
        UplinkTable::from_ranges(&ranges).unwrap()
    }

    fn leaf(model: Option<&str>) -> Inventory {
        let mut record = SwitchRecord::new("LEAF", SwitchRole::Leaf, "f");
        record.model = model.map(str::to_owned);
        Inventory::from_records([record])
    }

    fn init(inventory: &Inventory) -> Result<OrphanPortPredicate, CoreError> {
        let store = PolicyStore::new();
        let config = PredicateConfig {
            uplinks: Some(table()),
            ..PredicateConfig::default()
        };
        let mut pred = OrphanPortPredicate::default();
        pred.initialize(&PredicateContext {
            inventory,
            policies: &store,
            config: &config,
        })?;
        Ok(pred)
    }

    fn unit(name: &str, policy: &str, conf: &str) -> ConfigUnit {
        let mut pairs = Map::new();
        pairs.insert(CONF.into(), json!(conf));
        ConfigUnit::new(
            UnitKey::new(name, "LEAF"),
            None,
            unit_payload(policy, name, "LEAF", pairs),
        )
    }

    #[test]
    fn range_expansion() {
        let t = table();
        let ports = t.uplinks_for("N9K-C93180YC-EX").unwrap();
        assert_eq!(ports.len(), 6);
        assert!(ports.contains("Ethernet1/49"));
        assert!(ports.contains("Ethernet1/54"));
        assert!(t.uplinks_for("N9K-C9336C").is_none());
        assert_eq!(parse_port("Ethernet1/7"), Some(("1".to_owned(), 7)));
    }

    #[test]
    fn host_ports_get_suspend_once() {
        let pred = init(&leaf(Some("N9K-C93180YC-EX"))).unwrap();
        let u = unit("Ethernet1/5", "int_trunk_host_11_1", "");
        let mut copy = u.payload.clone();
        assert!(pred.apply(&u, &mut copy));
        assert_eq!(interface::nv_pair(&copy, CONF), Some(ORPHAN_SUSPEND));
        assert!(!pred.apply(&u, &mut copy));
    }

    #[test]
    fn uplinks_and_other_policies_untouched() {
        let pred = init(&leaf(Some("N9K-C93180YC-EX"))).unwrap();
        let uplink = unit("Ethernet1/50", "int_trunk_host", "");
        assert!(!pred.apply(&uplink, &mut uplink.payload.clone()));
        let routed = unit("Ethernet1/5", "int_routed_host", "");
        assert!(!pred.apply(&routed, &mut routed.payload.clone()));
    }

    #[test]
    fn unknown_model_fails_initialization() {
        let err = init(&leaf(Some("N9K-C9336C-FX2"))).unwrap_err();
        assert!(matches!(err, CoreError::PredicateInit { .. }));
        assert!(init(&leaf(None)).is_err());
    }
}
