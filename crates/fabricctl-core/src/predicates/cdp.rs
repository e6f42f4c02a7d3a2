// Disable CDP on host-facing leaf ports, and optionally on mgmt0.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::debug;

use super::{ChangePredicate, PredicateContext, Scope};
use crate::error::CoreError;
use crate::model::ConfigUnit;
use crate::model::interface::{self, CDP_ENABLE, CONF};

pub(super) const NAME: &str = "cdp";

const NO_CDP: &str = "no cdp enable";

#[derive(Debug, Default)]
pub struct CdpPredicate {
    mgmt: bool,
    leaves: BTreeSet<String>,
}

impl ChangePredicate for CdpPredicate {
    fn name(&self) -> &'static str {
        NAME
    }

    // Management interfaces may live on any switch; the ethernet rule
    // checks leaf membership itself.
    fn scope(&self) -> Scope {
        Scope::AnySwitch
    }

    fn initialize(&mut self, ctx: &PredicateContext<'_>) -> Result<(), CoreError> {
        self.mgmt = ctx.config.mgmt;
        self.leaves = ctx.inventory.leaf_serials();
        Ok(())
    }

    fn apply(&self, unit: &ConfigUnit, copy: &mut Value) -> bool {
        let name = unit.unit_name();

        if interface::is_mgmt(name) {
            if self.mgmt && interface::nv_pair(copy, CDP_ENABLE) == Some("true") {
                debug!(unit = %unit.key, "disabling cdp on management interface");
                return interface::set_nv_pair(copy, CDP_ENABLE, "false");
            }
            return false;
        }

        let eligible = self.leaves.contains(unit.serial_number())
            && interface::is_ethernet(name)
            && !interface::policy_name(copy).is_some_and(|p| p.contains("fabric"))
            && !interface::nv_pair(copy, CONF).is_some_and(|c| c.contains(NO_CDP));
        if !eligible {
            return false;
        }
        debug!(unit = %unit.key, "appending '{NO_CDP}'");
        interface::append_conf_line(copy, NO_CDP)
    }
}
