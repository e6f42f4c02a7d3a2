// ── Outcome sets ──

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Success/failure partition of a batch.
///
/// Recording a key on one side removes it from the other, so the two sides
/// never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize",
    deserialize = "K: Deserialize<'de> + Ord"
))]
pub struct OutcomeSet<K: Ord> {
    success: BTreeSet<K>,
    failure: BTreeSet<K>,
}

impl<K: Ord> Default for OutcomeSet<K> {
    fn default() -> Self {
        Self {
            success: BTreeSet::new(),
            failure: BTreeSet::new(),
        }
    }
}

impl<K: Ord + Clone> OutcomeSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, key: K) {
        self.failure.remove(&key);
        self.success.insert(key);
    }

    pub fn record_failure(&mut self, key: K) {
        self.success.remove(&key);
        self.failure.insert(key);
    }

    pub fn success(&self) -> &BTreeSet<K> {
        &self.success
    }

    pub fn failure(&self) -> &BTreeSet<K> {
        &self.failure
    }

    pub fn is_success(&self, key: &K) -> bool {
        self.success.contains(key)
    }

    /// No failures recorded.
    pub fn is_clean(&self) -> bool {
        self.failure.is_empty()
    }

    pub fn len(&self) -> usize {
        self.success.len() + self.failure.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold `other` in; a later failure wins over an earlier success.
    pub fn merge(&mut self, other: Self) {
        for key in other.success {
            if !self.failure.contains(&key) {
                self.success.insert(key);
            }
        }
        for key in other.failure {
            self.record_failure(key);
        }
    }
}
