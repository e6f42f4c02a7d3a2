// ── Policy and interface store ──
//
// Fetches switch policies and interface units, applies caller-supplied
// filters, and hands out copies. Also owns the policy delete/recreate
// calls used for superseded policies.

use std::collections::{BTreeMap, BTreeSet};

use fabricctl_api::{ApiRequest, Session};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancel::or_cancelled;
use crate::error::CoreError;
use crate::inventory::{Inventory, join};
use crate::matcher::{ConfigExtract, Extractor, PolicyFilter, UnitFilter};
use crate::model::interface::{self, CONF, POLICY_ID};
use crate::model::{ConfigUnit, OutcomeSet, PolicyRecord, UnitKey};

const POLICY_WRITE_ERROR: &str = "Invalid payload or any other internal server error";
const POLICY_DELETE_ERROR: &str =
    "Invalid payload or any other internal server error (e.g. policy does not exist)";

#[derive(Debug, Deserialize)]
struct WireInterfacePolicy {
    #[serde(default)]
    policy: Value,
    #[serde(default)]
    interfaces: Vec<Value>,
}

/// Policies grouped per switch, plus the interface units of the run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyStore {
    policies: BTreeMap<String, Vec<PolicyRecord>>,
    units: BTreeMap<UnitKey, ConfigUnit>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already-known data.
    pub fn from_parts(
        policies: impl IntoIterator<Item = PolicyRecord>,
        units: impl IntoIterator<Item = ConfigUnit>,
    ) -> Self {
        let mut grouped: BTreeMap<String, Vec<PolicyRecord>> = BTreeMap::new();
        for record in policies {
            grouped
                .entry(record.serial_number.clone())
                .or_default()
                .push(record);
        }
        Self {
            policies: grouped,
            units: units.into_iter().map(|u| (u.key.clone(), u)).collect(),
        }
    }

    // ── Policies ─────────────────────────────────────────────────────

    /// Fetch policies for `serials` (all inventory switches when `None`)
    /// and keep the ones that pass `filter`.
    ///
    /// Replaces any previously fetched policies. Switches left with no
    /// matching policy are dropped from the table.
    pub async fn fetch_policies(
        &mut self,
        session: &Session,
        inventory: &Inventory,
        serials: Option<&BTreeSet<String>>,
        filter: &PolicyFilter,
    ) -> Result<(), CoreError> {
        let serials = target_serials(inventory, serials)?;
        info!(count = serials.len(), "fetching switch policies");

        let request = ApiRequest::get("/control/policies/switches")
            .query("serialNumber", join(serials.iter().map(String::as_str)));
        let wire: Vec<Value> = session.request(request).await?.data_or_default()?;

        let mut grouped: BTreeMap<String, Vec<PolicyRecord>> = BTreeMap::new();
        for raw in wire {
            let record = PolicyRecord::from_value(raw)?;
            if let Some(fabric) = &filter.fabric {
                let on_fabric = inventory
                    .fabric_of(&record.serial_number)
                    .is_ok_and(|f| &f == fabric);
                if !on_fabric {
                    continue;
                }
            }
            if filter.matches(&record) {
                grouped
                    .entry(record.serial_number.clone())
                    .or_default()
                    .push(record);
            }
        }
        grouped.retain(|_, records| !records.is_empty());

        debug!(
            switches = grouped.len(),
            policies = grouped.values().map(Vec::len).sum::<usize>(),
            "policies after filtering"
        );
        self.policies = grouped;
        Ok(())
    }

    /// Copy of every kept policy, grouped by serial number.
    pub fn policies(&self) -> BTreeMap<String, Vec<PolicyRecord>> {
        self.policies.clone()
    }

    pub fn policies_for(&self, serial: &str) -> Vec<PolicyRecord> {
        self.policies.get(serial).cloned().unwrap_or_default()
    }

    pub fn policy_count(&self) -> usize {
        self.policies.values().map(Vec::len).sum()
    }

    /// Run `extractor` over each policy's generated config.
    ///
    /// Only policies that yield at least one value are returned.
    pub fn extract_from_config(&self, extractor: &dyn Extractor) -> Vec<ConfigExtract> {
        self.policies
            .values()
            .flatten()
            .filter_map(|policy| {
                let text = policy.generated_config.as_deref()?;
                let values: BTreeMap<UnitKey, String> = extractor
                    .extract(text)
                    .into_iter()
                    .map(|(unit, value)| (UnitKey::new(unit, policy.serial_number.clone()), value))
                    .collect();
                (!values.is_empty()).then(|| ConfigExtract {
                    policy: policy.clone(),
                    values,
                })
            })
            .collect()
    }

    // ── Interface units ──────────────────────────────────────────────

    /// Fetch interface units for `serials` (all inventory switches when
    /// `None`), one call per switch, keeping those that pass `filter`.
    pub async fn fetch_units(
        &mut self,
        session: &Session,
        inventory: &Inventory,
        serials: Option<&BTreeSet<String>>,
        filter: &UnitFilter,
    ) -> Result<(), CoreError> {
        let serials = target_serials(inventory, serials)?;
        let mut units = BTreeMap::new();

        for serial in &serials {
            info!(%serial, "fetching interfaces");
            let request = ApiRequest::get("/interface").query("serialNumber", serial.as_str());
            let wire: Vec<WireInterfacePolicy> =
                session.request(request).await?.data_or_default()?;

            for group in wire {
                for iface in group.interfaces {
                    let Some(unit) = split_unit(&group.policy, iface, serial) else {
                        warn!(%serial, "interface record without ifName skipped");
                        continue;
                    };
                    let conf = interface::nv_pair(&unit.payload, CONF);
                    if !filter.matches(interface::policy_name(&unit.payload), conf) {
                        continue;
                    }
                    if units.contains_key(&unit.key) {
                        warn!(unit = %unit.key, "duplicate interface record, keeping the last one");
                    }
                    units.insert(unit.key.clone(), unit);
                }
            }
        }

        debug!(count = units.len(), "interface units after filtering");
        self.units = units;
        Ok(())
    }

    /// Copy of every unit, in key order.
    pub fn units(&self) -> Vec<ConfigUnit> {
        self.units.values().cloned().collect()
    }

    pub fn unit(&self, key: &UnitKey) -> Option<ConfigUnit> {
        self.units.get(key).cloned()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Delete policies by id. More than one id goes out as a single
    /// batched call, so the batch succeeds or fails together.
    ///
    /// Only an authentication failure raises; anything else, an
    /// interrupted call included, is recorded as failure for the
    /// affected ids.
    pub async fn delete_policies(
        session: &Session,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<OutcomeSet<String>, CoreError> {
        let mut outcome = OutcomeSet::new();
        let request = match ids {
            [] => return Ok(outcome),
            [id] => ApiRequest::delete(format!("/control/policies/{id}")),
            _ => ApiRequest::delete("/control/policies/policyIds")
                .query("policyIds", join(ids.iter().map(String::as_str))),
        };

        info!(count = ids.len(), "deleting policies");
        let call = session.request(request.expect_error(500, POLICY_DELETE_ERROR));
        match or_cancelled(cancel, call).await {
            Ok(_) => ids.iter().for_each(|id| outcome.record_success(id.clone())),
            Err(CoreError::Cancelled) => {
                warn!(ids = %ids.join(","), "policy delete interrupted");
                ids.iter().for_each(|id| outcome.record_failure(id.clone()));
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(error = %err, ids = %ids.join(","), "policy delete failed");
                ids.iter().for_each(|id| outcome.record_failure(id.clone()));
            }
        }
        Ok(outcome)
    }

    /// POST each record back verbatim, one call per policy. Stops at
    /// cancellation; records not yet sent appear on neither side.
    pub async fn recreate_policies(
        session: &Session,
        records: &[PolicyRecord],
        cancel: &CancellationToken,
    ) -> Result<OutcomeSet<String>, CoreError> {
        let mut outcome = OutcomeSet::new();
        for record in records {
            if cancel.is_cancelled() {
                warn!("policy recreation cancelled");
                break;
            }
            info!(policy = %record.policy_id, serial = %record.serial_number, "recreating policy");
            let request = ApiRequest::post("/control/policies")
                .json(record.recreate_body())
                .expect_error(500, POLICY_WRITE_ERROR);
            match or_cancelled(cancel, session.request(request)).await {
                Ok(_) => outcome.record_success(record.policy_id.clone()),
                Err(CoreError::Cancelled) => {
                    warn!(policy = %record.policy_id, "policy recreation interrupted");
                    outcome.record_failure(record.policy_id.clone());
                    break;
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(error = %err, policy = %record.policy_id, "policy recreation failed");
                    outcome.record_failure(record.policy_id.clone());
                }
            }
        }
        Ok(outcome)
    }
}

fn target_serials(
    inventory: &Inventory,
    serials: Option<&BTreeSet<String>>,
) -> Result<BTreeSet<String>, CoreError> {
    match serials {
        Some(serials) => {
            for serial in serials {
                inventory.switch(serial)?;
            }
            Ok(serials.clone())
        }
        None if inventory.is_empty() => Err(CoreError::parameter(
            "no switches to query; run discovery or pass serial numbers",
        )),
        None => Ok(inventory.serials()),
    }
}

/// One `{policy, interfaces:[…]}` entry per interface.
fn split_unit(policy: &Value, iface: Value, fallback_serial: &str) -> Option<ConfigUnit> {
    let name = iface.get("ifName")?.as_str()?.to_owned();
    let serial = iface
        .get("serialNumber")
        .and_then(Value::as_str)
        .unwrap_or(fallback_serial)
        .to_owned();

    let payload = serde_json::json!({
        "policy": policy,
        "interfaces": [iface],
    });
    let policy_id = interface::nv_pair(&payload, POLICY_ID).map(str::to_owned);
    Some(ConfigUnit::new(UnitKey::new(name, serial), policy_id, payload))
}
