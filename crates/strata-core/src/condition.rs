//! Status conditions.
//!
//! | Type          | Meaning                                             |
//! |---------------|-----------------------------------------------------|
//! | `Ready`       | externally polled summary                           |
//! | `Plan`        | outcome of the last plan                            |
//! | `Apply`       | outcome of the last apply                           |
//! | `Output`      | outputs available / written                         |
//! | `HealthCheck` | outcome of post-apply probes                        |
//! | `StateLocked` | distributed state lock held / force-unlocked        |
//! | `Stalled`     | retry limit reached                                 |
//!
//! Conditions are stored keyed by type (at most one per type) and serialize
//! as an ordered list.

use std::collections::BTreeMap;
use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

pub const MAX_MESSAGE_LENGTH: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConditionType {
    Ready,
    Plan,
    Apply,
    Output,
    HealthCheck,
    StateLocked,
    Stalled,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "Ready",
            Self::Plan => "Plan",
            Self::Apply => "Apply",
            Self::Output => "Output",
            Self::HealthCheck => "HealthCheck",
            Self::StateLocked => "StateLocked",
            Self::Stalled => "Stalled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Canonical condition reasons.
pub mod reason {
    pub const ACCESS_DENIED: &str = "AccessDenied";
    pub const ARTIFACT_FAILED: &str = "ArtifactFailed";
    pub const RETRY_LIMIT_REACHED: &str = "RetryLimitReached";
    pub const DELETION_BLOCKED_BY_DEPENDANTS: &str = "DeletionBlockedByDependantsReason";
    pub const DEPENDENCY_NOT_READY: &str = "DependencyNotReady";
    pub const DRIFT_DETECTED: &str = "DriftDetected";
    pub const DRIFT_DETECTION_FAILED: &str = "DriftDetectionFailed";
    pub const HEALTH_CHECKS_FAILED: &str = "HealthChecksFailed";
    pub const HEALTH_CHECKS_SUCCEEDED: &str = "HealthChecksSucceed";
    pub const NO_DRIFT: &str = "NoDrift";
    pub const OUTPUTS_AVAILABLE: &str = "TerraformOutputsAvailable";
    pub const OUTPUTS_WRITTEN: &str = "TerraformOutputsWritten";
    pub const OUTPUTS_WRITING_FAILED: &str = "OutputsWritingFailed";
    pub const PLANNED_NO_CHANGES: &str = "TerraformPlannedNoChanges";
    pub const PLANNED_WITH_CHANGES: &str = "TerraformPlannedWithChanges";
    pub const APPLY_FAILED: &str = "TFExecApplyFailed";
    pub const APPLY_SUCCEEDED: &str = "TerraformAppliedSucceed";
    pub const APPLIED_FAIL: &str = "TerraformAppliedFail";
    pub const FORCE_UNLOCK: &str = "ForceUnlock";
    pub const INIT_FAILED: &str = "TFExecInitFailed";
    pub const LOCK_HELD: &str = "LockHeld";
    pub const NEW_FAILED: &str = "TFExecNewFailed";
    pub const OUTPUT_FAILED: &str = "TFExecOutputFailed";
    pub const PLAN_FAILED: &str = "TFExecPlanFailed";
    pub const TEMPLATE_GENERATION_FAILED: &str = "TemplateGenerationFailed";
    pub const VARS_GENERATION_FAILED: &str = "VarsGenerationFailed";
    pub const WORKSPACE_SELECT_FAILED: &str = "SelectWorkspaceFailed";
    pub const PROGRESSING: &str = "Progressing";
    pub const RECONCILIATION_FAILURE: &str = "ReconciliationFailure";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: Timestamp,
}

/// Keyed condition store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions {
    slots: BTreeMap<ConditionType, Condition>,
}

impl Conditions {
    pub fn get(&self, kind: ConditionType) -> Option<&Condition> {
        self.slots.get(&kind)
    }

    /// Insert or replace the condition of `kind`. The transition time only
    /// moves when the status changes.
    pub fn set(
        &mut self,
        kind: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) {
        let message = trim_message(message, MAX_MESSAGE_LENGTH);
        let last_transition_time = match self.slots.get(&kind) {
            Some(existing) if existing.status == status => existing.last_transition_time,
            _ => Timestamp::now(),
        };
        self.slots.insert(
            kind,
            Condition {
                kind,
                status,
                reason: reason.to_string(),
                message,
                last_transition_time,
            },
        );
    }

    pub fn remove(&mut self, kind: ConditionType) -> Option<Condition> {
        self.slots.remove(&kind)
    }

    pub fn status(&self, kind: ConditionType) -> Option<ConditionStatus> {
        self.get(kind).map(|c| c.status)
    }

    pub fn is_true(&self, kind: ConditionType) -> bool {
        self.status(kind) == Some(ConditionStatus::True)
    }

    pub fn reason(&self, kind: ConditionType) -> Option<&str> {
        self.get(kind).map(|c| c.reason.as_str())
    }

    pub fn has_any_reason(&self, kind: ConditionType, reasons: &[&str]) -> bool {
        self.reason(kind).is_some_and(|r| reasons.contains(&r))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.slots.values()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(list: Vec<Condition>) -> Self {
        // Later duplicates win.
        let slots = list.into_iter().map(|c| (c.kind, c)).collect();
        Self { slots }
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(conditions: Conditions) -> Self {
        conditions.slots.into_values().collect()
    }
}

/// Truncate to `limit` characters, appending `...` when cut.
pub fn trim_message(message: &str, limit: usize) -> String {
    let limit = limit.max(3);
    if message.chars().count() <= limit {
        return message.to_string();
    }
    let mut trimmed: String = message.chars().take(limit).collect();
    trimmed.push_str("...");
    trimmed
}
