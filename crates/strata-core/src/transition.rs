//! Status transitions applied by the reconciliation phases.
//!
//! Each helper mutates the resource's status in place; callers persist the
//! result with a status patch.

use jiff::Timestamp;

use crate::condition::{ConditionStatus, ConditionType, reason};
use crate::plan_id::{approve_message, plan_id};
use crate::resource::ManagedResource;
use crate::status::{Inventory, InventoryEntry, PlanRecord};

pub const PLAN_GENERATED: &str = "Plan generated";
pub const NO_OBJECTS_TO_DESTROY: &str = "No objects need to be destroyed";
pub const PLAN_ONLY_MODE: &str = ": This object is in the plan only mode.";

impl ManagedResource {
    /// Set `Ready` and stamp the observed generation. A non-empty `revision`
    /// becomes the last attempted revision.
    pub fn set_readiness(
        &mut self,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        revision: &str,
    ) {
        self.status
            .conditions
            .set(ConditionType::Ready, status, reason, message);
        self.status.observed_generation = self.metadata.generation;
        if !revision.is_empty() {
            self.status.last_attempted_revision = revision.to_string();
        }
    }

    pub fn mark_progressing(&mut self, message: &str) {
        self.status.conditions.set(
            ConditionType::Ready,
            ConditionStatus::Unknown,
            reason::PROGRESSING,
            message,
        );
    }

    pub fn mark_not_ready(&mut self, revision: &str, reason: &str, message: &str) {
        self.set_readiness(ConditionStatus::False, reason, message, revision);
    }

    pub fn mark_planned_with_changes(
        &mut self,
        revision: &str,
        force_or_auto_apply: bool,
        message: &str,
    ) {
        let id = plan_id(revision);
        self.status.conditions.set(
            ConditionType::Plan,
            ConditionStatus::True,
            reason::PLANNED_WITH_CHANGES,
            message,
        );
        self.status.plan = PlanRecord {
            last_applied: std::mem::take(&mut self.status.plan.last_applied),
            pending: id.clone(),
            is_destroy_plan: self.spec.destroy,
        };
        if !revision.is_empty() {
            self.status.last_attempted_revision = revision.to_string();
            self.status.last_planned_revision = revision.to_string();
        }
        self.status.last_plan_at = Some(Timestamp::now());

        // Plan-only wins over the approval mode.
        let ready_message = if self.spec.plan_only {
            format!("{message}{PLAN_ONLY_MODE}")
        } else if force_or_auto_apply {
            message.to_string()
        } else {
            approve_message(&id, message)
        };
        self.set_readiness(
            ConditionStatus::Unknown,
            reason::PLANNED_WITH_CHANGES,
            &ready_message,
            revision,
        );
    }

    pub fn mark_planned_no_changes(&mut self, revision: &str, message: &str) {
        self.status.conditions.set(
            ConditionType::Plan,
            ConditionStatus::False,
            reason::PLANNED_NO_CHANGES,
            message,
        );
        self.status.plan = PlanRecord {
            last_applied: std::mem::take(&mut self.status.plan.last_applied),
            pending: String::new(),
            is_destroy_plan: self.spec.destroy,
        };
        if !revision.is_empty() {
            self.status.last_attempted_revision = revision.to_string();
            self.status.last_planned_revision = revision.to_string();
        }
        self.status.last_plan_at = Some(Timestamp::now());
        self.set_readiness(
            ConditionStatus::True,
            reason::PLANNED_NO_CHANGES,
            &format!("{message}: {revision}"),
            revision,
        );
    }

    pub fn mark_applying(&mut self, revision: &str, message: &str) {
        self.status.conditions.set(
            ConditionType::Apply,
            ConditionStatus::Unknown,
            reason::PROGRESSING,
            message,
        );
        if !revision.is_empty() {
            self.status.last_attempted_revision = revision.to_string();
        }
    }

    /// Record a successful apply. The pending plan becomes the last applied
    /// one. An empty `entries` leaves the inventory untouched.
    pub fn mark_applied(
        &mut self,
        revision: &str,
        message: &str,
        is_destroy: bool,
        entries: Vec<InventoryEntry>,
    ) {
        self.status.conditions.set(
            ConditionType::Apply,
            ConditionStatus::True,
            reason::APPLY_SUCCEEDED,
            message,
        );
        self.status.plan = PlanRecord {
            last_applied: std::mem::take(&mut self.status.plan.pending),
            pending: String::new(),
            is_destroy_plan: is_destroy,
        };
        if !revision.is_empty() {
            self.status.last_applied_revision = revision.to_string();
        }
        if !entries.is_empty() {
            self.status.inventory = Some(Inventory { entries });
        }
        self.set_readiness(
            ConditionStatus::Unknown,
            reason::APPLY_SUCCEEDED,
            &format!("{message}: {revision}"),
            revision,
        );
    }

    /// Record a failed apply and drop the pending plan so the next pass
    /// plans afresh.
    pub fn mark_apply_failed(&mut self, revision: &str, reason: &str, message: &str) {
        self.status.conditions.set(
            ConditionType::Apply,
            ConditionStatus::False,
            reason::APPLIED_FAIL,
            message,
        );
        self.mark_not_ready(revision, reason, message);
        self.status.plan.pending.clear();
    }

    pub fn mark_drift_detected(&mut self, revision: &str, message: &str) {
        self.status.last_drift_detected_at = Some(Timestamp::now());
        self.set_readiness(
            ConditionStatus::False,
            reason::DRIFT_DETECTED,
            message,
            revision,
        );
    }

    pub fn mark_no_drift(&mut self, revision: &str, message: &str) {
        self.set_readiness(
            ConditionStatus::True,
            reason::NO_DRIFT,
            &format!("{message}: {revision}"),
            revision,
        );
    }

    pub fn mark_outputs_available(&mut self, names: Vec<String>, message: &str) {
        self.status.conditions.set(
            ConditionType::Output,
            ConditionStatus::True,
            reason::OUTPUTS_AVAILABLE,
            message,
        );
        self.status.available_outputs = names;
    }

    pub fn mark_outputs_written(&mut self, revision: &str, message: &str) {
        self.status.conditions.set(
            ConditionType::Output,
            ConditionStatus::True,
            reason::OUTPUTS_WRITTEN,
            message,
        );
        self.set_readiness(
            ConditionStatus::True,
            reason::OUTPUTS_WRITTEN,
            &format!("{message}: {revision}"),
            revision,
        );
    }

    pub fn mark_health_check_failed(&mut self, message: &str) {
        self.status.conditions.set(
            ConditionType::HealthCheck,
            ConditionStatus::False,
            reason::HEALTH_CHECKS_FAILED,
            message,
        );
    }

    pub fn mark_health_check_succeeded(&mut self, message: &str) {
        self.status.conditions.set(
            ConditionType::HealthCheck,
            ConditionStatus::True,
            reason::HEALTH_CHECKS_SUCCEEDED,
            message,
        );
    }

    pub fn mark_force_unlocked(&mut self, message: &str) {
        self.status.conditions.set(
            ConditionType::StateLocked,
            ConditionStatus::False,
            reason::FORCE_UNLOCK,
            message,
        );
        let lock = &mut self.status.lock;
        if !lock.pending.is_empty() {
            lock.last_applied = std::mem::take(&mut lock.pending);
        }
    }

    pub fn mark_state_locked(&mut self, lock_identifier: &str, message: &str) {
        self.status.conditions.set(
            ConditionType::StateLocked,
            ConditionStatus::True,
            reason::LOCK_HELD,
            message,
        );
        self.set_readiness(ConditionStatus::False, reason::LOCK_HELD, message, "");
        let lock = &mut self.status.lock;
        if !lock.pending.is_empty() && lock.last_applied != lock.pending {
            lock.last_applied = std::mem::take(&mut lock.pending);
        }
        lock.pending = lock_identifier.to_string();
    }

    pub fn mark_retry_limit_reached(&mut self) {
        self.status.conditions.set(
            ConditionType::Stalled,
            ConditionStatus::True,
            reason::RETRY_LIMIT_REACHED,
            "Resource reached maximum number of retries.",
        );
    }

    pub fn reset_retry(&mut self) {
        self.status.conditions.remove(ConditionType::Stalled);
        self.status.reconciliation_failures = 0;
    }

    /// Failures are counted on every failed pass, including past the
    /// remediation limit.
    pub fn increment_failures(&mut self) {
        self.status.reconciliation_failures = self.status.reconciliation_failures.saturating_add(1);
    }
}
