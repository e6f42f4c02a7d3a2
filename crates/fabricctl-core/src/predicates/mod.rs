// ── Change predicates ──
//
// A predicate looks at one configuration unit and may mutate the copy it
// is handed. The registry is a static name → constructor table; the
// caller picks predicates by name at startup.

mod cdp;
mod desc;
mod orphan_port;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

pub use cdp::CdpPredicate;
pub use desc::DescriptionPredicate;
pub use orphan_port::{OrphanPortPredicate, UplinkTable};

use crate::error::CoreError;
use crate::inventory::Inventory;
use crate::matcher::Extractor;
use crate::model::{ConfigUnit, PolicyRecord, UnitKey};
use crate::policy_store::PolicyStore;

/// Which switches a predicate is evaluated on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Scope {
    LeafOnly,
    #[default]
    AnySwitch,
}

/// External inputs for the built-in predicates.
#[derive(Clone, Default)]
pub struct PredicateConfig {
    /// Desired interface descriptions keyed by unit.
    pub desired: Option<BTreeMap<UnitKey, String>>,
    /// Pulls `(interface, description)` pairs out of freeform policy
    /// config when no desired table is given.
    pub description_source: Option<Arc<dyn Extractor>>,
    pub description_scope: Scope,
    pub uplinks: Option<UplinkTable>,
    /// Also disable CDP on management interfaces.
    pub mgmt: bool,
}

impl fmt::Debug for PredicateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateConfig")
            .field("desired", &self.desired.as_ref().map(BTreeMap::len))
            .field("description_source", &self.description_source.is_some())
            .field("description_scope", &self.description_scope)
            .field("uplinks", &self.uplinks)
            .field("mgmt", &self.mgmt)
            .finish()
    }
}

/// Read-only view handed to [`ChangePredicate::initialize`].
#[derive(Debug, Clone, Copy)]
pub struct PredicateContext<'a> {
    pub inventory: &'a Inventory,
    pub policies: &'a PolicyStore,
    pub config: &'a PredicateConfig,
}

/// One change rule.
///
/// `initialize` runs once per run before any unit is evaluated. `apply`
/// only touches `copy` and reports whether it changed it.
pub trait ChangePredicate: Send + Sync {
    fn name(&self) -> &'static str;

    fn scope(&self) -> Scope;

    fn initialize(&mut self, ctx: &PredicateContext<'_>) -> Result<(), CoreError>;

    fn apply(&self, unit: &ConfigUnit, copy: &mut Value) -> bool;

    /// Policies this predicate's changes replace. They are deleted before
    /// the push and kept in the snapshot for rollback.
    fn superseded_policies(&self) -> Vec<PolicyRecord> {
        Vec::new()
    }
}

type Constructor = fn() -> Box<dyn ChangePredicate>;

/// Name → constructor table.
#[derive(Clone)]
pub struct PredicateRegistry {
    entries: BTreeMap<&'static str, Constructor>,
}

impl PredicateRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// `cdp`, `desc` and `orphan-port`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(cdp::NAME, || Box::new(CdpPredicate::default()));
        registry.register(desc::NAME, || Box::new(DescriptionPredicate::default()));
        registry.register(orphan_port::NAME, || Box::new(OrphanPortPredicate::default()));
        registry
    }

    pub fn register(&mut self, name: &'static str, constructor: Constructor) {
        self.entries.insert(name, constructor);
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Instantiate the named predicates in name order.
    ///
    /// Unknown names are rejected; duplicates are collapsed.
    pub fn create<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<Box<dyn ChangePredicate>>, CoreError> {
        let mut selected = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            let Some((key, _)) = self.entries.get_key_value(name) else {
                let known: Vec<_> = self.names().collect();
                return Err(CoreError::parameter(format!(
                    "unknown predicate '{name}' (available: {})",
                    known.join(", ")
                )));
            };
            selected.insert(*key);
        }
        Ok(selected
            .into_iter()
            .filter_map(|name| self.entries.get(name).map(|ctor| ctor()))
            .collect())
    }
}

impl Default for PredicateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

/// Initialize every predicate against the same context.
pub fn initialize_all(
    predicates: &mut [Box<dyn ChangePredicate>],
    ctx: &PredicateContext<'_>,
) -> Result<(), CoreError> {
    for predicate in predicates.iter_mut() {
        debug!(predicate = predicate.name(), "initializing predicate");
        predicate.initialize(ctx).map_err(|e| match e {
            CoreError::PredicateInit { .. } => e,
            other => CoreError::PredicateInit {
                predicate: predicate.name().to_owned(),
                message: other.to_string(),
            },
        })?;
    }
    Ok(())
}

pub(crate) fn init_error(predicate: &str, message: impl Into<String>) -> CoreError {
    CoreError::PredicateInit {
        predicate: predicate.to_owned(),
        message: message.into(),
    }
}
