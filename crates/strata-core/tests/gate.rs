//! Phase predicates: plan, apply, drift, retry.

use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use strata_core::resource::{ForceUnlockMode, Remediation, RetryStrategy, StateSpec};
use strata_core::{ApprovePlan, ManagedResource};

const REV: &str = "main/b8e362c206e3d0cbb7ed22ced771a0056455a2fb";

fn resource() -> ManagedResource {
    let mut r = ManagedResource::default();
    r.metadata.name = "hello".into();
    r.metadata.namespace = "flux-system".into();
    r.metadata.generation = 1;
    r
}

fn steady_state() -> ManagedResource {
    let mut r = resource();
    r.status.last_attempted_revision = REV.into();
    r.status.last_applied_revision = REV.into();
    r.status.last_planned_revision = REV.into();
    r
}

#[test]
fn should_plan_when_forced_or_nothing_pending() {
    let mut r = resource();
    assert!(r.should_plan());

    r.status.plan.pending = "plan-main-abc".into();
    assert!(!r.should_plan());

    r.spec.force = true;
    assert!(r.should_plan());
}

#[test]
fn should_apply_truth_table() {
    let mut r = resource();
    r.status.plan.pending = "plan-main-b8e362c206e3d0cbb7ed".into();

    // Empty approval never applies.
    assert!(!r.should_apply());

    r.spec.approve_plan = ApprovePlan::Auto;
    assert!(r.should_apply());

    r.spec.approve_plan = ApprovePlan::Plan("plan-main-b8e362c206e3d0cbb7ed".into());
    assert!(r.should_apply());

    // Left-anchored prefix approves.
    r.spec.approve_plan = ApprovePlan::Plan("plan-main-b8e362c206".into());
    assert!(r.should_apply());

    r.spec.approve_plan = ApprovePlan::Plan("plan-main-ffff".into());
    assert!(!r.should_apply());

    // Not anchored at the start.
    r.spec.approve_plan = ApprovePlan::Plan("main-b8e362c206".into());
    assert!(!r.should_apply());

    r.spec.approve_plan = ApprovePlan::Disable;
    assert!(!r.should_apply());

    r.spec.force = true;
    assert!(r.should_apply());
}

#[test]
fn auto_without_pending_plan_does_not_apply() {
    let mut r = resource();
    r.spec.approve_plan = ApprovePlan::Auto;
    assert!(!r.should_apply());
    assert!(r.force_or_auto_apply());
}

#[test]
fn drift_disabled_never_detects() {
    let mut r = steady_state();
    r.spec.disable_drift_detection = true;
    assert!(!r.should_detect_drift(REV));
}

#[test]
fn drift_destroy_never_detects() {
    let mut r = steady_state();
    r.spec.destroy = true;
    assert!(!r.should_detect_drift(REV));

    r.spec.approve_plan = ApprovePlan::Disable;
    assert!(!r.should_detect_drift(REV));
}

#[test]
fn drift_detection_only_mode_always_detects() {
    let mut r = resource();
    r.spec.approve_plan = ApprovePlan::Disable;
    assert!(r.should_detect_drift(REV));

    r.status.plan.pending = "plan-main-b8e362c206".into();
    assert!(r.should_detect_drift("other/rev"));
}

#[test]
fn drift_brand_new_object_does_not_detect() {
    let r = resource();
    assert!(!r.should_detect_drift(REV));
}

#[test]
fn drift_steady_state_detects() {
    let r = steady_state();
    assert!(r.should_detect_drift(REV));
}

#[test]
fn drift_replanned_no_op_detects() {
    let mut r = steady_state();
    r.status.last_applied_revision = "main/0000000000".into();
    assert!(r.should_detect_drift(REV));
}

#[test]
fn drift_pending_plan_does_not_detect() {
    let mut r = steady_state();
    r.status.plan.pending = "plan-main-b8e362c206".into();
    assert!(!r.should_detect_drift(REV));
}

#[test]
fn drift_new_revision_does_not_detect() {
    let r = steady_state();
    assert!(!r.should_detect_drift("main/1111111111"));
}

#[test]
fn retry_limit() {
    let mut r = resource();
    r.status.reconciliation_failures = 100;
    assert!(r.should_retry());

    r.spec.remediation = Some(Remediation { retries: -1 });
    assert!(r.should_retry());

    r.spec.remediation = Some(Remediation { retries: 3 });
    r.status.reconciliation_failures = 2;
    assert!(r.should_retry());
    r.status.reconciliation_failures = 3;
    assert!(!r.should_retry());
}

#[test]
fn retry_interval_static_and_exponential() {
    let mut r = resource();
    assert_eq!(r.retry_interval(), Duration::from_secs(15));

    r.spec.retry_interval = Some(SignedDuration::from_secs(10));
    r.status.reconciliation_failures = 3;
    assert_eq!(r.retry_interval(), Duration::from_secs(10));

    r.spec.retry_strategy = RetryStrategy::ExponentialBackoff;
    assert_eq!(r.retry_interval(), Duration::from_secs(80));

    r.spec.max_retry_interval = Some(SignedDuration::from_secs(60));
    assert_eq!(r.retry_interval(), Duration::from_secs(60));

    r.status.reconciliation_failures = 200;
    assert_eq!(r.retry_interval(), Duration::from_secs(60));
}

#[test]
fn reconcile_gated_by_interval_after_plan() {
    let now = Timestamp::now();
    let mut r = resource();
    assert_eq!(r.should_reconcile(now), (true, Duration::ZERO));

    r.status.observed_generation = 1;
    r.status.last_plan_at = Some(now);
    r.spec.interval = SignedDuration::from_mins(10);
    let (run, wait) = r.should_reconcile(now);
    assert!(!run);
    assert_eq!(wait, Duration::from_secs(600));

    // A generation bump runs immediately.
    r.metadata.generation = 2;
    assert!(r.should_reconcile(now).0);
    r.metadata.generation = 1;

    r.status.plan.pending = "plan-main-abc".into();
    assert!(r.should_reconcile(now).0);
    r.status.plan.pending.clear();

    let later = now.checked_add(SignedDuration::from_mins(11)).unwrap();
    assert!(r.should_reconcile(later).0);
}

#[test]
fn force_unlock_yes_requires_matching_identifier() {
    let mut r = resource();
    r.status.lock.pending = "f2ab685b-f84d-ac0b-a125-378646a4bc3a".into();
    assert_eq!(r.force_unlock_target(), None);

    r.spec.state = Some(StateSpec {
        force_unlock: ForceUnlockMode::Yes,
        lock_identifier: "f2ab685b".into(),
    });
    assert_eq!(r.force_unlock_target(), None);

    r.spec.state = Some(StateSpec {
        force_unlock: ForceUnlockMode::Yes,
        lock_identifier: "f2ab685b-f84d-ac0b-a125-378646a4bc3a".into(),
    });
    assert_eq!(
        r.force_unlock_target(),
        Some("f2ab685b-f84d-ac0b-a125-378646a4bc3a")
    );

    r.spec.state = Some(StateSpec {
        force_unlock: ForceUnlockMode::No,
        lock_identifier: "f2ab685b-f84d-ac0b-a125-378646a4bc3a".into(),
    });
    assert_eq!(r.force_unlock_target(), None);
}

#[test]
fn force_unlock_auto_takes_pending_lock() {
    let mut r = resource();
    r.spec.state = Some(StateSpec {
        force_unlock: ForceUnlockMode::Auto,
        lock_identifier: String::new(),
    });
    assert_eq!(r.force_unlock_target(), None);

    r.status.lock.pending = "lock-1".into();
    assert_eq!(r.force_unlock_target(), Some("lock-1"));
}

#[test]
fn plan_only_never_applies() {
    let mut r = resource();
    r.spec.plan_only = true;
    r.status.plan.pending = "plan-main-b8e362c206".into();

    r.spec.approve_plan = ApprovePlan::Auto;
    assert!(!r.should_apply());
    r.spec.approve_plan = ApprovePlan::Plan("plan-main-b8e362c206".into());
    assert!(!r.should_apply());
    r.spec.force = true;
    assert!(!r.should_apply());
    assert!(r.awaits_approval());

    r.spec.plan_only = false;
    assert!(!r.awaits_approval());
}
