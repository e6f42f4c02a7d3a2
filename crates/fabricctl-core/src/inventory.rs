// ── Switch inventory ──
//
// Owns the switch table for one run. Discovery rebuilds it wholesale;
// callers only get copies out.

use std::collections::{BTreeMap, BTreeSet};

use fabricctl_api::{ApiRequest, Error as ApiError, Session};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{SwitchRecord, SwitchRole, VpcPeer};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSwitch {
    serial_number: String,
    #[serde(default)]
    switch_role: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    fabric_name: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    logical_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFabricName {
    fabric_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSwitchDetails {
    serial_number: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    logical_name: Option<String>,
}

/// The switch table, keyed by serial number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    switches: BTreeMap<String, SwitchRecord>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from already-known records.
    pub fn from_records(records: impl IntoIterator<Item = SwitchRecord>) -> Self {
        Self {
            switches: records
                .into_iter()
                .map(|r| (r.serial_number.clone(), r))
                .collect(),
        }
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Fetch the switch table from the controller.
    ///
    /// `None` (or an empty set) fetches every switch; otherwise only the
    /// given serials. The previous table is discarded either way.
    pub async fn discover(
        &mut self,
        session: &Session,
        serials: Option<&BTreeSet<String>>,
    ) -> Result<(), CoreError> {
        let request = match serials {
            Some(serials) if !serials.is_empty() => {
                info!(count = serials.len(), "discovering switches by serial number");
                ApiRequest::get("/control/switches/roles")
                    .query("serialNumber", join(serials.iter().map(String::as_str)))
            }
            _ => {
                info!("discovering all switches");
                ApiRequest::get("/inventory/switches")
            }
        };

        let wire: Vec<WireSwitch> = session.request(request).await?.data_or_default()?;

        let mut switches = BTreeMap::new();
        for switch in wire {
            let fabric_name = match switch.fabric_name.filter(|f| !f.is_empty()) {
                Some(fabric) => fabric,
                None => lookup_fabric(session, &switch.serial_number).await?,
            };
            let role = switch
                .switch_role
                .or(switch.role)
                .map_or(SwitchRole::Other, |r| SwitchRole::from_controller(&r));

            let mut record = SwitchRecord::new(switch.serial_number, role, fabric_name);
            record.model = switch.model;
            record.name = switch.logical_name;
            switches.insert(record.serial_number.clone(), record);
        }

        if let Some(requested) = serials {
            for missing in requested.iter().filter(|s| !switches.contains_key(*s)) {
                warn!(serial = %missing, "requested switch not returned by controller");
            }
        }

        debug!(count = switches.len(), "switch table rebuilt");
        self.switches = switches;
        Ok(())
    }

    /// Ask the controller for the VPC peer of every switch not yet checked.
    ///
    /// Both members of a pair are set together. A switch the controller
    /// reports as unpaired is marked [`VpcPeer::Unpaired`].
    pub async fn resolve_peers(&mut self, session: &Session) -> Result<(), CoreError> {
        let serials: Vec<String> = self.switches.keys().cloned().collect();
        for serial in serials {
            if self.switches.get(&serial).is_some_and(|s| s.peer.is_checked()) {
                continue;
            }

            match fetch_peer_pair(session, &serial).await? {
                Some((first, second)) if first == serial || second == serial => {
                    debug!(%first, %second, "vpc pair resolved");
                    self.set_peer(&first, VpcPeer::Paired(second.clone()));
                    self.set_peer(&second, VpcPeer::Paired(first));
                }
                Some((first, second)) => {
                    warn!(%serial, %first, %second, "vpc pair does not include queried switch");
                    self.set_peer(&serial, VpcPeer::Unpaired);
                }
                None => self.set_peer(&serial, VpcPeer::Unpaired),
            }
        }
        Ok(())
    }

    fn set_peer(&mut self, serial: &str, peer: VpcPeer) {
        if let Some(record) = self.switches.get_mut(serial) {
            record.peer = peer;
        }
    }

    /// Fill hardware model and host name from each fabric's inventory.
    pub async fn fetch_details(&mut self, session: &Session) -> Result<(), CoreError> {
        let fabrics: BTreeSet<String> = self
            .switches
            .values()
            .map(|s| s.fabric_name.clone())
            .collect();

        for fabric in fabrics {
            let path = format!("/control/fabrics/{fabric}/inventory");
            let details: Vec<WireSwitchDetails> =
                session.request(ApiRequest::get(path)).await?.data_or_default()?;
            for detail in details {
                if let Some(record) = self.switches.get_mut(&detail.serial_number) {
                    if detail.model.is_some() {
                        record.model = detail.model;
                    }
                    if detail.logical_name.is_some() {
                        record.name = detail.logical_name;
                    }
                }
            }
        }
        Ok(())
    }

    // ── Views ────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.switches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.switches.contains_key(serial)
    }

    /// Copy of one record. Unknown serials are a caller error.
    pub fn switch(&self, serial: &str) -> Result<SwitchRecord, CoreError> {
        self.get(serial).cloned()
    }

    pub fn switches(&self) -> Vec<SwitchRecord> {
        self.switches.values().cloned().collect()
    }

    pub fn serials(&self) -> BTreeSet<String> {
        self.switches.keys().cloned().collect()
    }

    pub fn fabric_of(&self, serial: &str) -> Result<String, CoreError> {
        Ok(self.get(serial)?.fabric_name.clone())
    }

    pub fn is_leaf(&self, serial: &str) -> Result<bool, CoreError> {
        Ok(self.get(serial)?.is_leaf())
    }

    pub fn peer_of(&self, serial: &str) -> Result<Option<String>, CoreError> {
        Ok(self.get(serial)?.peer.serial().map(str::to_owned))
    }

    pub fn leaf_serials(&self) -> BTreeSet<String> {
        self.switches
            .values()
            .filter(|s| s.is_leaf())
            .map(|s| s.serial_number.clone())
            .collect()
    }

    pub fn non_leaf_serials(&self) -> BTreeSet<String> {
        self.switches
            .values()
            .filter(|s| !s.is_leaf())
            .map(|s| s.serial_number.clone())
            .collect()
    }

    fn get(&self, serial: &str) -> Result<&SwitchRecord, CoreError> {
        self.switches
            .get(serial)
            .ok_or_else(|| CoreError::parameter(format!("unknown switch serial number '{serial}'")))
    }
}

pub(crate) fn join<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items.into_iter().collect::<Vec<_>>().join(",")
}

async fn lookup_fabric(session: &Session, serial: &str) -> Result<String, CoreError> {
    debug!(%serial, "looking up fabric for switch");
    let request = ApiRequest::get(format!("/control/switches/{serial}/fabric-name"))
        .expect_error(500, "Invalid switch or Other exception");
    let wire: WireFabricName = session.request(request).await?.data()?;
    Ok(wire.fabric_name)
}

/// `Ok(None)` when the controller says the switch is not in a pair.
async fn fetch_peer_pair(
    session: &Session,
    serial: &str,
) -> Result<Option<(String, String)>, CoreError> {
    let request = ApiRequest::get("/interface/vpcpair_serial_number")
        .query("serial_number", serial)
        .expect_error(
            500,
            "The specified serial number is not part of a vPC pair or any other internal server error.",
        );

    let body = match session.request(request).await {
        Ok(response) => response.body,
        Err(ApiError::ServerResponse { status: 500, .. }) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let pair = body.get("vpc_pair_sn").and_then(Value::as_str);
    Ok(pair.and_then(|p| {
        let (first, second) = p.split_once('~')?;
        Some((first.trim().to_owned(), second.trim().to_owned()))
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn table() -> Inventory {
        Inventory::from_records([
            SwitchRecord::new("S1", SwitchRole::Leaf, "site-1"),
            SwitchRecord::new("S2", SwitchRole::Other, "site-1"),
            SwitchRecord::new("S3", SwitchRole::Leaf, "site-2"),
        ])
    }

    #[test]
    fn leaf_partition_is_exact() {
        let inv = table();
        let leaves = inv.leaf_serials();
        let others = inv.non_leaf_serials();
        assert!(leaves.is_disjoint(&others));
        let union: BTreeSet<_> = leaves.union(&others).cloned().collect();
        assert_eq!(union, inv.serials());
    }

    #[test]
    fn unknown_serial_is_parameter_error() {
        let inv = table();
        assert!(matches!(inv.switch("nope"), Err(CoreError::Parameter { .. })));
        assert!(matches!(inv.fabric_of("nope"), Err(CoreError::Parameter { .. })));
        assert_eq!(inv.fabric_of("S3").unwrap(), "site-2");
    }

    #[test]
    fn views_are_copies() {
        let inv = table();
        let mut copy = inv.switches();
        copy[0].role = SwitchRole::Other;
        assert!(inv.is_leaf("S1").unwrap());
    }
}
