//! One full reconciliation pass over the phases.
//!
//! Setup, then drift detection, plan, apply, outputs and health checks, each
//! gated on the resource's status. The engine scratch directory is released
//! whatever the outcome.

use strata_core::status::Inventory;
use strata_core::transition::PLAN_GENERATED;
use strata_core::{ApprovePlan, ConditionStatus, ConditionType, ManagedResource, reason};
use strata_engine::protocol::InstanceRequest;

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::setup::Workspace;
use crate::source::Artifact;

impl Reconciler {
    pub(crate) async fn run_phases(
        &self,
        resource: &mut ManagedResource,
        artifact: &Artifact,
    ) -> Result<(), ControllerError> {
        let key = resource.key();
        let correlation_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(resource = %key, revision = %artifact.revision, correlation_id = %correlation_id, "setting up workspace");

        let extracted = self.prepare_workspace(resource, artifact).await?;
        let outcome = match self
            .bind_instance(resource, &extracted, &artifact.revision, &correlation_id)
            .await
        {
            Ok(workspace) => {
                self.run_bound_phases(resource, &workspace, &artifact.revision)
                    .await
            }
            Err(e) => {
                tracing::error!(resource = %key, error = %e, "error in workspace setup");
                Err(e)
            }
        };
        self.cleanup(&key, &extracted.tmp_dir).await;
        outcome
    }

    async fn run_bound_phases(
        &self,
        resource: &mut ManagedResource,
        workspace: &Workspace,
        revision: &str,
    ) -> Result<(), ControllerError> {
        let key = resource.key();
        if resource.should_detect_drift(revision) {
            match self.detect_drift(resource, workspace, revision).await {
                Ok(()) => {
                    if self.outputs_may_be_drifted(resource).await? {
                        tracing::info!(resource = %key, "output secret missing, extracting outputs");
                        self.process_outputs(resource, workspace, revision).await?;
                    }
                    return Ok(());
                }
                Err(e) if !e.is_drift() => {
                    tracing::error!(resource = %key, error = %e, "drift detection failed");
                    return Err(e);
                }
                Err(e) if !resource.force_or_auto_apply() => {
                    tracing::info!(resource = %key, "will not force or auto apply detected drift");
                    return Err(e);
                }
                Err(_) => self.patch_status(resource).await?,
            }
        }

        if resource.spec.approve_plan == ApprovePlan::Disable {
            tracing::info!(resource = %key, "approve plan disabled");
            return Ok(());
        }

        if resource.should_plan() {
            self.plan(resource, workspace, revision).await?;
            self.patch_status(resource).await?;
        }

        if resource.should_apply() {
            self.apply(resource, workspace, revision).await?;
            self.patch_status(resource).await?;
        } else {
            tracing::debug!(resource = %key, "should apply == false");
        }

        self.process_outputs(resource, workspace, revision).await?;

        if resource.should_check_health() {
            self.run_health_checks(resource, revision).await?;
            self.patch_status(resource).await?;
        }

        self.refresh_inventory(resource, workspace).await;
        finish_readiness(resource);
        Ok(())
    }

    /// Fill a missing inventory. Failures are logged and left for the next
    /// pass.
    async fn refresh_inventory(&self, resource: &mut ManagedResource, workspace: &Workspace) {
        if !resource.spec.enable_inventory {
            resource.status.inventory = None;
            return;
        }
        if resource.status.inventory.is_some() || resource.status.plan.is_destroy_plan {
            return;
        }

        let key = resource.key();
        match self
            .engine
            .get_inventory(InstanceRequest {
                instance: workspace.instance.clone(),
            })
            .await
        {
            Ok(entries) => {
                tracing::info!(resource = %key, entries = entries.len(), "got inventory");
                if !entries.is_empty() {
                    resource.status.inventory = Some(Inventory { entries });
                }
            }
            Err(e) => tracing::error!(resource = %key, error = %e, "error getting inventory"),
        }
    }
}

/// A pass that left `Ready` unknown has finished its work, unless it is
/// waiting on plan approval or still progressing.
fn finish_readiness(resource: &mut ManagedResource) {
    let Some(ready) = resource.status.conditions.get(ConditionType::Ready) else {
        return;
    };
    if ready.status != ConditionStatus::Unknown {
        return;
    }
    let awaiting_approval =
        ready.reason == reason::PLANNED_WITH_CHANGES && ready.message.starts_with(PLAN_GENERATED);
    if awaiting_approval || ready.reason == reason::PROGRESSING {
        return;
    }
    let (reason, message) = (ready.reason.clone(), ready.message.clone());
    resource
        .status
        .conditions
        .set(ConditionType::Ready, ConditionStatus::True, &reason, &message);
}
