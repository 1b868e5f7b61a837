mod common;

use common::{NAMESPACE, REV, auto, harness};
use strata_core::resource::{ForceUnlockMode, StateSpec};
use strata_core::{ConditionType, reason};

const LOCK_ID: &str = "f2ab685b-f84d-ac0b-a125-378a22877e8d";

#[tokio::test]
async fn held_lock_is_recorded_then_released_on_auto() {
    let h = harness();
    h.publish(NAMESPACE, "hello", REV);
    h.engine.script().plan_lock = Some(LOCK_ID.to_string());
    let key = h.create(auto("hello")).await;

    h.reconcile_fresh(&key).await;
    let r = h.get(&key).await;
    assert_eq!(r.status.lock.pending, LOCK_ID);
    assert_eq!(
        r.status.conditions.reason(ConditionType::StateLocked),
        Some(reason::LOCK_HELD)
    );
    assert_eq!(r.status.conditions.reason(ConditionType::Ready), Some(reason::PLAN_FAILED));

    let events = h.cluster.events_for(&key).await;
    let locked = events
        .iter()
        .find(|e| e.reason == reason::LOCK_HELD)
        .expect("lock event");
    assert_eq!(
        locked.message,
        format!("Plan error: State locked with Lock Identifier {LOCK_ID}")
    );

    h.cluster
        .update_spec(&key, |spec| {
            spec.state = Some(StateSpec {
                force_unlock: ForceUnlockMode::Auto,
                lock_identifier: String::new(),
            })
        })
        .await
        .expect("update");
    h.reconcile(&key).await;

    assert_eq!(h.engine.count(&format!("force_unlock:{LOCK_ID}")), 1);
    let r = h.get(&key).await;
    assert!(r.status.lock.pending.is_empty());
    assert_eq!(r.status.lock.last_applied, LOCK_ID);
    let unlocked = r
        .status
        .conditions
        .get(ConditionType::StateLocked)
        .expect("state locked condition");
    assert_eq!(unlocked.reason, reason::FORCE_UNLOCK);
    assert_eq!(
        unlocked.message,
        format!("Terraform Force Unlock with Lock Identifier: {LOCK_ID}")
    );
    assert!(r.status.conditions.is_true(ConditionType::Ready));
}

#[tokio::test]
async fn yes_mode_needs_the_operator_to_name_the_lock() {
    let h = harness();
    h.publish(NAMESPACE, "hello", REV);
    h.engine.script().plan_lock = Some(LOCK_ID.to_string());
    let key = h.create(auto("hello")).await;
    h.reconcile_fresh(&key).await;

    h.cluster
        .update_spec(&key, |spec| {
            spec.state = Some(StateSpec {
                force_unlock: ForceUnlockMode::Yes,
                lock_identifier: "some-other-lock".to_string(),
            })
        })
        .await
        .expect("update");
    h.reconcile(&key).await;
    assert!(h.engine.calls().iter().all(|c| !c.starts_with("force_unlock")));
    assert_eq!(h.get(&key).await.status.lock.pending, LOCK_ID);

    h.cluster
        .update_spec(&key, |spec| {
            spec.state = Some(StateSpec {
                force_unlock: ForceUnlockMode::Yes,
                lock_identifier: LOCK_ID.to_string(),
            })
        })
        .await
        .expect("update");
    h.reconcile(&key).await;
    assert_eq!(h.engine.count(&format!("force_unlock:{LOCK_ID}")), 1);
    assert!(h.get(&key).await.status.conditions.is_true(ConditionType::Ready));
}
