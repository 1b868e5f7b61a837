use strata_core::plan_id::{approve_message, plan_id};
use strata_core::transition::{NO_OBJECTS_TO_DESTROY, PLAN_GENERATED};
use strata_core::{ManagedResource, reason};
use strata_engine::EngineError;
use strata_engine::protocol::{PlanRequest, SavePlanRequest};

use crate::cluster::Severity;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::setup::{Workspace, not_ready};

pub const PLAN_FILE: &str = "tfplan";

impl Reconciler {
    /// Compute a plan for `revision` and persist it under the resource's
    /// identity. A plan with changes becomes the pending plan.
    pub(crate) async fn plan(
        &self,
        resource: &mut ManagedResource,
        workspace: &Workspace,
        revision: &str,
    ) -> Result<(), ControllerError> {
        let key = resource.key();
        tracing::info!(resource = %key, revision, "planning");

        resource.mark_progressing("Terraform Planning");
        self.patch_status(resource).await?;

        let disabled = resource.backend_completely_disabled();
        let destroy = resource.spec.destroy
            || (resource.is_being_deleted() && resource.spec.destroy_resources_on_deletion);
        let request = PlanRequest {
            instance: workspace.instance.clone(),
            out: if disabled { String::new() } else { PLAN_FILE.to_string() },
            refresh: true,
            targets: resource.spec.targets.clone(),
            destroy,
        };

        let reply = match self.engine.plan(request).await {
            Ok(reply) => reply,
            Err(e) => {
                self.report_locked(resource, &e, "Plan", revision).await;
                return Err(not_ready(
                    resource,
                    revision,
                    reason::PLAN_FAILED,
                    format!("error running Plan: {e}"),
                ));
            }
        };
        tracing::info!(
            resource = %key,
            drifted = reply.drifted,
            message = %reply.message,
            "plan finished"
        );

        if destroy && !reply.plan_created {
            resource.mark_planned_no_changes(revision, NO_OBJECTS_TO_DESTROY);
            return Ok(());
        }

        let saved = self
            .engine
            .save_plan(SavePlanRequest {
                instance: workspace.instance.clone(),
                backend_completely_disabled: disabled,
                name: resource.name().to_string(),
                namespace: resource.namespace().to_string(),
                uid: resource.metadata.uid.clone(),
                revision: revision.to_string(),
            })
            .await
            .map_err(|e| {
                not_ready(
                    resource,
                    revision,
                    reason::PLAN_FAILED,
                    format!("error saving plan secret: {e}"),
                )
            })?;
        tracing::debug!(resource = %key, reply = %saved.message, "plan saved");

        if reply.drifted {
            let force_or_auto = resource.force_or_auto_apply();
            if !force_or_auto && !resource.spec.plan_only {
                let msg = format!(
                    "Planned.\n{}",
                    approve_message(&plan_id(revision), PLAN_GENERATED)
                );
                self.event(resource, Severity::Info, reason::PLANNED_WITH_CHANGES, msg, revision)
                    .await;
            }
            resource.mark_planned_with_changes(revision, force_or_auto, PLAN_GENERATED);
        } else {
            resource.mark_planned_no_changes(revision, "Plan no changes");
        }
        Ok(())
    }

    /// Emit the failure event for `operation`, recording a held lock as a
    /// structured `StateLocked` condition.
    pub(crate) async fn report_locked(
        &self,
        resource: &mut ManagedResource,
        err: &EngineError,
        operation: &str,
        revision: &str,
    ) {
        match &err.lock_identifier {
            Some(lock_id) => {
                self.event(
                    resource,
                    Severity::Error,
                    reason::LOCK_HELD,
                    format!("{operation} error: State locked with Lock Identifier {lock_id}"),
                    revision,
                )
                .await;
                resource.mark_state_locked(
                    lock_id,
                    &format!("Terraform Locked with Lock Identifier: {lock_id}"),
                );
            }
            None => {
                tracing::warn!(resource = %resource.key(), operation, error = %err, "engine call failed");
                self.event(
                    resource,
                    Severity::Error,
                    reason::RECONCILIATION_FAILURE,
                    format!("{operation} error: {err}"),
                    revision,
                )
                .await;
            }
        }
    }
}
