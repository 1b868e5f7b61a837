use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::condition::Conditions;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_applied: String,
    /// At most one plan is pending at a time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pending: String,
    #[serde(default)]
    pub is_destroy_plan: bool,
}

/// Mirror of the external distributed state lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_applied: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pending: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub identifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub entries: Vec<InventoryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_applied_revision: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_attempted_revision: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_planned_revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_plan_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_drift_detected_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_outputs: Vec<String>,
    #[serde(default)]
    pub plan: PlanRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<Inventory>,
    #[serde(default)]
    pub lock: LockRecord,
    #[serde(default)]
    pub reconciliation_failures: i64,
}
