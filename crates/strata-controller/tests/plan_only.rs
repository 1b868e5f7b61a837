mod common;

use common::{NAMESPACE, REV, REV2, auto, harness, resource};
use strata_controller::Action;
use strata_core::plan_id::plan_id;
use strata_core::{ConditionStatus, ConditionType, ManagedResource, reason};

fn plan_only(mut r: ManagedResource) -> ManagedResource {
    r.spec.plan_only = true;
    r
}

#[tokio::test]
async fn plans_are_recorded_but_never_applied() {
    let h = harness();
    h.publish(NAMESPACE, "hello", REV);
    let key = h.create(plan_only(resource("hello"))).await;

    let action = h.reconcile_fresh(&key).await;
    assert_eq!(action, Action::await_change());

    let r = h.get(&key).await;
    assert_eq!(r.status.plan.pending, plan_id(REV));
    let ready = r.status.conditions.get(ConditionType::Ready).expect("ready");
    assert_eq!(ready.status, ConditionStatus::Unknown);
    assert_eq!(ready.reason, reason::PLANNED_WITH_CHANGES);
    assert_eq!(ready.message, "Plan generated: This object is in the plan only mode.");
    assert_eq!(h.engine.count("apply"), 0);
    assert!(
        !h.event_reasons(&key)
            .await
            .contains(&reason::PLANNED_WITH_CHANGES.to_string())
    );

    // Same revision: nothing to do until the source moves.
    h.reconcile(&key).await;
    assert_eq!(h.engine.count("plan:tfplan"), 1);
}

#[tokio::test]
async fn new_revision_replaces_the_pending_plan() {
    let h = harness();
    h.publish(NAMESPACE, "hello", REV);
    let key = h.create(plan_only(resource("hello"))).await;
    h.reconcile_fresh(&key).await;
    assert_eq!(h.get(&key).await.status.plan.pending, plan_id(REV));

    h.publish(NAMESPACE, "hello", REV2);
    h.reconcile(&key).await;

    let r = h.get(&key).await;
    assert_eq!(r.status.plan.pending, plan_id(REV2));
    assert_eq!(r.status.last_planned_revision, REV2);
    assert_eq!(h.engine.count("plan:tfplan"), 2);
    assert_eq!(h.engine.count("apply"), 0);
}

#[tokio::test]
async fn auto_approve_does_not_override_plan_only() {
    let h = harness();
    h.publish(NAMESPACE, "hello", REV);
    let key = h.create(plan_only(auto("hello"))).await;

    let action = h.reconcile_fresh(&key).await;
    assert_eq!(action, Action::await_change());
    let r = h.get(&key).await;
    assert_eq!(r.status.plan.pending, plan_id(REV));
    assert!(r.status.conditions.get(ConditionType::Apply).is_none());
    assert_eq!(
        r.status.conditions.status(ConditionType::Ready),
        Some(ConditionStatus::Unknown)
    );
    assert_eq!(h.engine.count("apply"), 0);

    h.reconcile(&key).await;
    assert_eq!(h.engine.count("plan:tfplan"), 1);
}
