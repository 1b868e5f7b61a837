//! Decision predicates that gate each reconciliation phase.

use std::time::Duration;

use jiff::{SignedDuration, Timestamp};

use crate::condition::{ConditionType, reason};
use crate::plan_id::approves;
use crate::resource::{ApprovePlan, ForceUnlockMode, ManagedResource, RetryStrategy};

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_RETRY_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

impl ManagedResource {
    /// A new plan is needed when forced or when nothing is pending.
    pub fn should_plan(&self) -> bool {
        self.spec.force || self.status.plan.pending.is_empty()
    }

    pub fn should_apply(&self) -> bool {
        if self.spec.plan_only {
            return false;
        }
        if self.spec.force {
            return true;
        }
        let pending = &self.status.plan.pending;
        match &self.spec.approve_plan {
            ApprovePlan::Manual | ApprovePlan::Disable => false,
            ApprovePlan::Auto => !pending.is_empty(),
            ApprovePlan::Plan(approval) => approves(approval, pending),
        }
    }

    pub fn force_or_auto_apply(&self) -> bool {
        self.spec.force || self.spec.approve_plan == ApprovePlan::Auto
    }

    /// A pending plan waits for someone: manual mode, or plan-only.
    pub fn awaits_approval(&self) -> bool {
        self.spec.plan_only || !self.force_or_auto_apply()
    }

    /// Order matters: each rule short-circuits the ones below it.
    pub fn should_detect_drift(&self, revision: &str) -> bool {
        if self.spec.disable_drift_detection {
            return false;
        }
        if self.spec.destroy {
            return false;
        }
        if self.spec.approve_plan == ApprovePlan::Disable {
            return true;
        }

        let status = &self.status;
        if status.last_attempted_revision.is_empty()
            && status.last_applied_revision.is_empty()
            && status.last_planned_revision.is_empty()
        {
            return false;
        }

        let no_pending = status.plan.pending.is_empty();
        let attempted_planned_current = status.last_attempted_revision == revision
            && status.last_planned_revision == revision;

        if attempted_planned_current && status.last_applied_revision == revision && no_pending {
            return true;
        }
        // Replanned to a no-op while the applied revision lags behind.
        attempted_planned_current && no_pending
    }

    /// The lock to release before planning, if any. `yes` needs the
    /// operator's identifier to equal the observed one; `auto` takes
    /// whatever is pending.
    pub fn force_unlock_target(&self) -> Option<&str> {
        let state = self.spec.state.as_ref()?;
        let pending = self.status.lock.pending.as_str();
        if pending.is_empty() {
            return None;
        }
        match state.force_unlock {
            ForceUnlockMode::Yes if state.lock_identifier == pending => Some(pending),
            ForceUnlockMode::Auto => Some(pending),
            _ => None,
        }
    }

    /// Probe again after a failure, or once after a successful apply.
    pub fn should_check_health(&self) -> bool {
        if self.spec.health_checks.is_empty() {
            return false;
        }
        let conditions = &self.status.conditions;
        let health = conditions.reason(ConditionType::HealthCheck);
        if health == Some(reason::HEALTH_CHECKS_FAILED) {
            return true;
        }
        conditions.reason(ConditionType::Apply) == Some(reason::APPLY_SUCCEEDED) && health.is_none()
    }

    /// Whether a pass should run now, or how long until it should.
    pub fn should_reconcile(&self, now: Timestamp) -> (bool, Duration) {
        if self.spec.force || self.is_being_deleted() {
            return (true, Duration::ZERO);
        }
        let Some(last_plan_at) = self.status.last_plan_at else {
            return (true, Duration::ZERO);
        };
        if self.generation() != self.status.observed_generation {
            return (true, Duration::ZERO);
        }
        if !self.status.plan.pending.is_empty() || self.should_apply() {
            return (true, Duration::ZERO);
        }

        let next = last_plan_at.checked_add(self.spec.interval).unwrap_or(last_plan_at);
        let remaining = now.duration_until(next);
        if remaining > SignedDuration::ZERO {
            (false, remaining.unsigned_abs())
        } else {
            (true, Duration::ZERO)
        }
    }

    /// No remediation or a negative retry count retries forever.
    pub fn should_retry(&self) -> bool {
        match &self.spec.remediation {
            None => true,
            Some(remediation) if remediation.retries < 0 => true,
            Some(remediation) => self.status.reconciliation_failures < remediation.retries,
        }
    }

    pub fn retry_interval(&self) -> Duration {
        let base = self
            .spec
            .retry_interval
            .map(SignedDuration::unsigned_abs)
            .unwrap_or(DEFAULT_RETRY_INTERVAL);

        if self.spec.retry_strategy != RetryStrategy::ExponentialBackoff {
            return base;
        }

        let max = self
            .spec
            .max_retry_interval
            .map(SignedDuration::unsigned_abs)
            .unwrap_or(DEFAULT_MAX_RETRY_INTERVAL);
        let exponent = u32::try_from(self.status.reconciliation_failures.max(0)).unwrap_or(u32::MAX);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        base.checked_mul(factor).map_or(max, |interval| interval.min(max))
    }

    pub fn interval(&self) -> Duration {
        self.spec.interval.unsigned_abs()
    }
}
