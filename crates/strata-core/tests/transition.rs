use strata_core::plan_id::plan_id;
use strata_core::status::InventoryEntry;
use strata_core::transition::PLAN_GENERATED;
use strata_core::{ConditionStatus, ConditionType, ManagedResource, reason};

const REV: &str = "main/b8e362c206e3d0cbb7ed22ced771a0056455a2fb";

fn resource() -> ManagedResource {
    let mut r = ManagedResource::default();
    r.metadata.name = "hello".into();
    r.metadata.namespace = "flux-system".into();
    r.metadata.generation = 3;
    r
}

#[test]
fn planned_with_changes_manual_leaves_ready_unknown_with_approve_message() {
    let mut r = resource();
    r.mark_planned_with_changes(REV, false, PLAN_GENERATED);

    assert_eq!(r.status.plan.pending, plan_id(REV));
    assert_eq!(r.status.last_planned_revision, REV);
    assert!(r.status.last_plan_at.is_some());
    assert_eq!(r.status.observed_generation, 3);

    let ready = r.status.conditions.get(ConditionType::Ready).unwrap();
    assert_eq!(ready.status, ConditionStatus::Unknown);
    assert_eq!(ready.reason, reason::PLANNED_WITH_CHANGES);
    assert!(ready.message.starts_with("Plan generated: set approvePlan: \"plan-main-"));
}

#[test]
fn planned_no_changes_is_ready() {
    let mut r = resource();
    r.status.plan.pending = "plan-old".into();
    r.mark_planned_no_changes(REV, "Plan no changes");

    assert!(r.status.plan.pending.is_empty());
    assert!(r.status.conditions.is_true(ConditionType::Ready));
    assert_eq!(
        r.status.conditions.get(ConditionType::Ready).unwrap().message,
        format!("Plan no changes: {REV}")
    );
    assert_eq!(r.status.conditions.status(ConditionType::Plan), Some(ConditionStatus::False));
}

#[test]
fn applied_moves_pending_to_last_applied() {
    let mut r = resource();
    r.mark_planned_with_changes(REV, true, PLAN_GENERATED);
    let entries = vec![InventoryEntry {
        name: "null_resource.a".into(),
        kind: "null_resource".into(),
        identifier: "123".into(),
    }];
    r.mark_applied(REV, "Applied successfully", false, entries);

    assert!(r.status.plan.pending.is_empty());
    assert_eq!(r.status.plan.last_applied, plan_id(REV));
    assert_eq!(r.status.last_applied_revision, REV);
    assert_eq!(r.status.inventory.as_ref().unwrap().entries.len(), 1);
    assert_eq!(
        r.status.conditions.reason(ConditionType::Apply),
        Some(reason::APPLY_SUCCEEDED)
    );
}

#[test]
fn apply_failure_resets_pending_plan() {
    let mut r = resource();
    r.mark_planned_with_changes(REV, true, PLAN_GENERATED);
    r.mark_apply_failed(REV, reason::APPLY_FAILED, "error running Apply: boom");

    assert!(r.status.plan.pending.is_empty());
    assert_eq!(r.status.conditions.reason(ConditionType::Apply), Some(reason::APPLIED_FAIL));
    assert_eq!(r.status.conditions.reason(ConditionType::Ready), Some(reason::APPLY_FAILED));
    assert!(r.should_plan());
}

#[test]
fn state_lock_then_force_unlock() {
    let mut r = resource();
    r.mark_state_locked("f2ab685b", "Terraform Locked with Lock Identifier: f2ab685b");
    assert_eq!(r.status.lock.pending, "f2ab685b");
    assert!(r.status.conditions.is_true(ConditionType::StateLocked));
    assert_eq!(r.status.conditions.status(ConditionType::Ready), Some(ConditionStatus::False));

    r.mark_force_unlocked("Terraform Force Unlock with Lock Identifier: f2ab685b");
    assert!(r.status.lock.pending.is_empty());
    assert_eq!(r.status.lock.last_applied, "f2ab685b");
    assert_eq!(
        r.status.conditions.reason(ConditionType::StateLocked),
        Some(reason::FORCE_UNLOCK)
    );
}

#[test]
fn drift_detected_stamps_timestamp() {
    let mut r = resource();
    r.mark_drift_detected(REV, "- null_resource.a");
    assert!(r.status.last_drift_detected_at.is_some());
    assert_eq!(r.status.conditions.reason(ConditionType::Ready), Some(reason::DRIFT_DETECTED));
}

#[test]
fn retry_limit_and_reset() {
    let mut r = resource();
    r.increment_failures();
    r.increment_failures();
    r.mark_retry_limit_reached();
    assert_eq!(r.status.reconciliation_failures, 2);
    assert!(r.status.conditions.is_true(ConditionType::Stalled));

    r.reset_retry();
    assert_eq!(r.status.reconciliation_failures, 0);
    assert!(r.status.conditions.get(ConditionType::Stalled).is_none());
}

#[test]
fn plan_only_takes_precedence_in_the_ready_message() {
    let mut r = resource();
    r.spec.plan_only = true;
    r.mark_planned_with_changes(REV, true, PLAN_GENERATED);

    assert_eq!(r.status.plan.pending, plan_id(REV));
    let ready = r.status.conditions.get(ConditionType::Ready).unwrap();
    assert_eq!(ready.status, ConditionStatus::Unknown);
    assert_eq!(ready.reason, reason::PLANNED_WITH_CHANGES);
    assert_eq!(ready.message, "Plan generated: This object is in the plan only mode.");
}
