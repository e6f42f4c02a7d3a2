// Interface descriptions from a desired-value table, or lifted out of
// switch freeform policies.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{debug, info};

use super::{ChangePredicate, PredicateContext, Scope, init_error};
use crate::error::CoreError;
use crate::model::interface::{self, DESC};
use crate::model::{ConfigUnit, PolicyRecord, UnitKey};

pub(super) const NAME: &str = "desc";

#[derive(Debug, Default)]
pub struct DescriptionPredicate {
    scope: Scope,
    desired: BTreeMap<UnitKey, String>,
    superseded: Vec<PolicyRecord>,
}

impl ChangePredicate for DescriptionPredicate {
    fn name(&self) -> &'static str {
        NAME
    }

    fn scope(&self) -> Scope {
        self.scope
    }

    fn initialize(&mut self, ctx: &PredicateContext<'_>) -> Result<(), CoreError> {
        self.scope = ctx.config.description_scope;
        self.superseded.clear();

        if let Some(desired) = &ctx.config.desired {
            info!(count = desired.len(), "descriptions from desired table");
            self.desired = desired.clone();
            return Ok(());
        }

        let Some(source) = &ctx.config.description_source else {
            return Err(init_error(
                NAME,
                "no desired description table and no freeform policy pattern",
            ));
        };

        let extracts = ctx.policies.extract_from_config(source.as_ref());
        let mut desired = BTreeMap::new();
        let mut seen = BTreeSet::new();
        for extract in extracts {
            desired.extend(extract.values);
            if seen.insert(extract.policy.policy_id.clone()) {
                self.superseded.push(extract.policy);
            }
        }
        info!(
            count = desired.len(),
            policies = self.superseded.len(),
            "descriptions from freeform policies"
        );
        self.desired = desired;
        Ok(())
    }

    fn apply(&self, unit: &ConfigUnit, copy: &mut Value) -> bool {
        if unit.unit_name().to_ascii_lowercase().contains("vpc") {
            return false;
        }
        let Some(wanted) = self.desired.get(&unit.key) else {
            return false;
        };
        if interface::nv_pair(copy, DESC) == Some(wanted.as_str()) {
            return false;
        }
        debug!(unit = %unit.key, description = %wanted, "description change");
        interface::set_nv_pair(copy, DESC, wanted.as_str())
    }

    fn superseded_policies(&self) -> Vec<PolicyRecord> {
        self.superseded.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Map, json};

    use super::*;
    use crate::inventory::Inventory;
    use crate::model::interface::unit_payload;
    use crate::policy_store::PolicyStore;
    use crate::predicates::PredicateConfig;

    fn unit(name: &str, desc: &str) -> ConfigUnit {
        let mut pairs = Map::new();
        pairs.insert(DESC.into(), json!(desc));
        ConfigUnit::new(
            UnitKey::new(name, "SN1"),
            None,
            unit_payload("int_trunk_host", name, "SN1", pairs),
        )
    }

    fn initialized(config: &PredicateConfig, store: &PolicyStore) -> DescriptionPredicate {
        let inventory = Inventory::new();
        let mut pred = DescriptionPredicate::default();
        pred.initialize(&PredicateContext {
            inventory: &inventory,
            policies: store,
            config,
        })
        .unwrap();
        pred
    }

    #[test]
    fn sets_description_once() {
        let mut desired = BTreeMap::new();
        desired.insert(UnitKey::new("Ethernet1/1", "SN1"), "web-01".to_owned());
        let config = PredicateConfig {
            desired: Some(desired),
            ..PredicateConfig::default()
        };
        let pred = initialized(&config, &PolicyStore::new());

        let u = unit("Ethernet1/1", "");
        let mut copy = u.payload.clone();
        assert!(pred.apply(&u, &mut copy));
        assert_eq!(interface::nv_pair(&copy, DESC), Some("web-01"));

        let applied = ConfigUnit::new(u.key.clone(), None, copy.clone());
        let mut again = copy.clone();
        assert!(!pred.apply(&applied, &mut again));
        assert_eq!(again, copy);
    }

    #[test]
    fn vpc_interfaces_are_skipped() {
        let mut desired = BTreeMap::new();
        desired.insert(UnitKey::new("vPC10", "SN1"), "peer".to_owned());
        let config = PredicateConfig {
            desired: Some(desired),
            ..PredicateConfig::default()
        };
        let pred = initialized(&config, &PolicyStore::new());
        let u = unit("vPC10", "");
        assert!(!pred.apply(&u, &mut u.payload.clone()));
    }

    #[test]
    fn freeform_policies_become_superseded() {
        let policy = PolicyRecord::from_value(json!({
            "policyId": "POLICY-7",
            "serialNumber": "SN1",
            "templateName": "switch_freeform",
            "generatedConfig": "interface Ethernet1/2\n  description db",
        }))
        .unwrap();
        let store = PolicyStore::from_parts([policy], Vec::new());
        let extractor = |_: &str| vec![("Ethernet1/2".to_owned(), "db".to_owned())];
        let config = PredicateConfig {
            description_source: Some(Arc::new(extractor)),
            ..PredicateConfig::default()
        };
        let pred = initialized(&config, &store);

        let superseded = pred.superseded_policies();
        assert_eq!(superseded.len(), 1);
        assert_eq!(superseded[0].policy_id, "POLICY-7");
        let u = unit("Ethernet1/2", "");
        assert!(pred.apply(&u, &mut u.payload.clone()));
    }

    #[test]
    fn missing_source_fails_initialization() {
        let inventory = Inventory::new();
        let store = PolicyStore::new();
        let config = PredicateConfig::default();
        let err = DescriptionPredicate::default()
            .initialize(&PredicateContext {
                inventory: &inventory,
                policies: &store,
                config: &config,
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::PredicateInit { .. }));
    }
}
