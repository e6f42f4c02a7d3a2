// ── Record matchers ──
//
// Filters are built from opaque matchers supplied by the caller. The core
// never sees a pattern, only `is_match`. The binary compiles regular
// expressions into these.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::model::{PolicyRecord, UnitKey};

/// A compiled text predicate.
pub trait Matcher: Send + Sync {
    fn is_match(&self, text: &str) -> bool;
}

impl<F> Matcher for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_match(&self, text: &str) -> bool {
        self(text)
    }
}

/// Pulls `(unit name, value)` pairs out of a policy's generated config,
/// e.g. every `interface X` / `description Y` stanza.
pub trait Extractor: Send + Sync {
    fn extract(&self, text: &str) -> Vec<(String, String)>;
}

impl<F> Extractor for F
where
    F: Fn(&str) -> Vec<(String, String)> + Send + Sync,
{
    fn extract(&self, text: &str) -> Vec<(String, String)> {
        self(text)
    }
}

/// Values extracted from one policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigExtract {
    pub policy: PolicyRecord,
    pub values: BTreeMap<UnitKey, String>,
}

pub type SharedMatcher = Arc<dyn Matcher>;

/// Any-of within a field, all-of across fields. An empty field list
/// accepts everything.
fn field_matches(matchers: &[SharedMatcher], value: Option<&str>) -> bool {
    if matchers.is_empty() {
        return true;
    }
    let value = value.unwrap_or_default();
    matchers.iter().any(|m| m.is_match(value))
}

// ── PolicyFilter ─────────────────────────────────────────────────────

/// Conjunction of per-field policy matchers.
#[derive(Clone, Default)]
pub struct PolicyFilter {
    pub description: Vec<SharedMatcher>,
    pub entity_name: Vec<SharedMatcher>,
    pub entity_type: Vec<SharedMatcher>,
    pub template_name: Vec<SharedMatcher>,
    pub generated_config: Vec<SharedMatcher>,
    /// Keep only policies on switches in this fabric.
    pub fabric: Option<String>,
}

impl PolicyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, m: impl Matcher + 'static) -> Self {
        self.description.push(Arc::new(m));
        self
    }

    pub fn entity_name(mut self, m: impl Matcher + 'static) -> Self {
        self.entity_name.push(Arc::new(m));
        self
    }

    pub fn entity_type(mut self, m: impl Matcher + 'static) -> Self {
        self.entity_type.push(Arc::new(m));
        self
    }

    pub fn template_name(mut self, m: impl Matcher + 'static) -> Self {
        self.template_name.push(Arc::new(m));
        self
    }

    pub fn generated_config(mut self, m: impl Matcher + 'static) -> Self {
        self.generated_config.push(Arc::new(m));
        self
    }

    pub fn fabric(mut self, fabric: impl Into<String>) -> Self {
        self.fabric = Some(fabric.into());
        self
    }

    /// Field matchers only; the fabric check needs inventory and is done
    /// by the store.
    pub fn matches(&self, record: &PolicyRecord) -> bool {
        field_matches(&self.description, record.description.as_deref())
            && field_matches(&self.entity_name, record.entity_name.as_deref())
            && field_matches(&self.entity_type, record.entity_type.as_deref())
            && field_matches(&self.template_name, record.template_name.as_deref())
            && field_matches(&self.generated_config, record.generated_config.as_deref())
    }
}

impl fmt::Debug for PolicyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyFilter")
            .field("description", &self.description.len())
            .field("entity_name", &self.entity_name.len())
            .field("entity_type", &self.entity_type.len())
            .field("template_name", &self.template_name.len())
            .field("generated_config", &self.generated_config.len())
            .field("fabric", &self.fabric)
            .finish()
    }
}

// ── UnitFilter ───────────────────────────────────────────────────────

/// Interface-unit filter over the unit's policy name and `CONF` text.
#[derive(Clone, Default)]
pub struct UnitFilter {
    pub policy: Vec<SharedMatcher>,
    pub config: Vec<SharedMatcher>,
}

impl UnitFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(mut self, m: impl Matcher + 'static) -> Self {
        self.policy.push(Arc::new(m));
        self
    }

    pub fn config(mut self, m: impl Matcher + 'static) -> Self {
        self.config.push(Arc::new(m));
        self
    }

    pub fn matches(&self, policy: Option<&str>, conf: Option<&str>) -> bool {
        field_matches(&self.policy, policy) && field_matches(&self.config, conf)
    }
}

impl fmt::Debug for UnitFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitFilter")
            .field("policy", &self.policy.len())
            .field("config", &self.config.len())
            .finish()
    }
}
