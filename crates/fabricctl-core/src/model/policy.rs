// ── Policy records ──

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// One controller policy as returned by `GET /control/policies/switches`.
///
/// The typed fields are what filters and predicates look at; `raw` is the
/// record exactly as the controller sent it and is what rollback POSTs back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub policy_id: String,
    pub serial_number: String,
    pub template_name: Option<String>,
    pub description: Option<String>,
    pub entity_type: Option<String>,
    pub entity_name: Option<String>,
    pub generated_config: Option<String>,
    pub raw: Value,
}

impl PolicyRecord {
    pub fn from_value(raw: Value) -> Result<Self, CoreError> {
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_owned);

        let policy_id = text("policyId").ok_or_else(|| CoreError::Deserialization {
            message: "policy record without policyId".into(),
        })?;
        let serial_number = text("serialNumber").ok_or_else(|| CoreError::Deserialization {
            message: format!("policy {policy_id} without serialNumber"),
        })?;

        Ok(Self {
            policy_id,
            serial_number,
            template_name: text("templateName"),
            description: text("description"),
            entity_type: text("entityType"),
            entity_name: text("entityName"),
            generated_config: text("generatedConfig"),
            raw,
        })
    }

    /// The record as POSTed back to `/control/policies` on recreation.
    ///
    /// Matches what the controller handed out on fetch.
    pub fn recreate_body(&self) -> Value {
        self.raw.clone()
    }
}
