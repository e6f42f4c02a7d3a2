// ── Diff engine ──
//
// Runs the selected predicates over every unit and splits out the ones
// that changed. Output depends only on the inputs: units are visited in
// key order and predicates in registry order.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::error::CoreError;
use crate::inventory::Inventory;
use crate::model::{ChangeSet, ConfigUnit, PolicyRecord, Snapshot};
use crate::predicates::{ChangePredicate, Scope};

/// Build the change set and its pre-change snapshot.
///
/// Leaf-only predicates are skipped for units on non-leaf switches. A
/// unit whose switch is not in `inventory` is a caller error.
pub fn compute_change_set(
    units: &[ConfigUnit],
    inventory: &Inventory,
    predicates: &[Box<dyn ChangePredicate>],
) -> Result<(ChangeSet, Snapshot), CoreError> {
    let mut ordered: Vec<&ConfigUnit> = units.iter().collect();
    ordered.sort_by(|a, b| a.key.cmp(&b.key));

    let mut changed = BTreeMap::new();
    let mut original = BTreeMap::new();

    for unit in ordered {
        let leaf = inventory.is_leaf(unit.serial_number())?;
        let mut copy = unit.payload.clone();
        let mut mutated = false;

        for predicate in predicates {
            if predicate.scope() == Scope::LeafOnly && !leaf {
                continue;
            }
            if predicate.apply(unit, &mut copy) {
                debug!(unit = %unit.key, predicate = predicate.name(), "unit changed");
                mutated = true;
            }
        }

        if mutated {
            original.insert(unit.key.clone(), unit.payload.clone());
            changed.insert(unit.key.clone(), copy);
        }
    }

    let superseded = collect_superseded(predicates);
    info!(
        units = changed.len(),
        superseded = superseded.len(),
        "change set computed"
    );
    Ok((ChangeSet::from_units(changed), Snapshot::new(original, superseded)))
}

fn collect_superseded(predicates: &[Box<dyn ChangePredicate>]) -> Vec<PolicyRecord> {
    let mut seen = BTreeSet::new();
    let mut records: Vec<PolicyRecord> = predicates
        .iter()
        .flat_map(|p| p.superseded_policies())
        .filter(|r| seen.insert(r.policy_id.clone()))
        .collect();
    records.sort_by(|a, b| a.policy_id.cmp(&b.policy_id));
    records
}
