use strata_core::{ManagedResource, reason};
use strata_engine::protocol::{ApplyRequest, DestroyRequest, InstanceRequest, LoadPlanRequest};

use crate::cluster::Severity;
use crate::error::ControllerError;
use crate::plan::PLAN_FILE;
use crate::reconciler::Reconciler;
use crate::setup::{Workspace, not_ready};

impl Reconciler {
    /// Apply the pending plan. Any failure other than a held lock drops the
    /// pending plan so the next pass plans again from scratch.
    pub(crate) async fn apply(
        &self,
        resource: &mut ManagedResource,
        workspace: &Workspace,
        revision: &str,
    ) -> Result<(), ControllerError> {
        let key = resource.key();
        tracing::info!(resource = %key, revision, pending = %resource.status.plan.pending, "applying");

        resource.mark_progressing("Applying");
        self.patch_status(resource).await?;

        let disabled = resource.backend_completely_disabled();
        let loaded = self
            .engine
            .load_plan(LoadPlanRequest {
                instance: workspace.instance.clone(),
                name: resource.name().to_string(),
                namespace: resource.namespace().to_string(),
                backend_completely_disabled: disabled,
                pending_plan: resource.status.plan.pending.clone(),
            })
            .await
            .map_err(|e| not_ready(resource, revision, reason::APPLY_FAILED, e.to_string()))?;
        tracing::debug!(resource = %key, reply = %loaded.message, "plan loaded");

        resource.mark_applying(revision, "Apply started");
        self.patch_status(resource).await?;

        // Without a backend there is no plan file to replay, so a destroy is
        // issued directly.
        let is_destroy = if disabled && resource.spec.destroy {
            let destroyed = self
                .engine
                .destroy(DestroyRequest {
                    instance: workspace.instance.clone(),
                    targets: resource.spec.targets.clone(),
                })
                .await;
            if let Err(e) = destroyed {
                self.report_locked(resource, &e, "Destroy", revision).await;
                let msg = format!("error running Destroy: {e}");
                resource.mark_apply_failed(revision, reason::APPLY_FAILED, &msg);
                return Err(ControllerError::Phase(msg));
            }
            true
        } else {
            let applied = self
                .engine
                .apply(ApplyRequest {
                    instance: workspace.instance.clone(),
                    parallelism: resource.spec.parallelism,
                    refresh_before_apply: resource.spec.refresh_before_apply,
                    targets: resource.spec.targets.clone(),
                    dir_or_plan: if disabled { String::new() } else { PLAN_FILE.to_string() },
                })
                .await;
            if let Err(e) = applied {
                self.report_locked(resource, &e, "Apply", revision).await;
                let msg = format!("error running Apply: {e}");
                resource.mark_apply_failed(revision, reason::APPLY_FAILED, &msg);
                return Err(ControllerError::Phase(msg));
            }
            resource.status.plan.is_destroy_plan
        };

        let mut entries = Vec::new();
        if resource.spec.enable_inventory && !is_destroy {
            match self
                .engine
                .get_inventory(InstanceRequest {
                    instance: workspace.instance.clone(),
                })
                .await
            {
                Ok(found) => {
                    tracing::info!(resource = %key, entries = found.len(), "got inventory");
                    entries = found;
                }
                Err(e) => {
                    let msg = format!("error getting inventory after Apply: {e}");
                    resource.mark_apply_failed(revision, reason::APPLY_FAILED, &msg);
                    return Err(ControllerError::Phase(msg));
                }
            }
        }

        let message = if is_destroy {
            "Destroy applied successfully"
        } else {
            "Applied successfully"
        };
        self.event(resource, Severity::Info, reason::APPLY_SUCCEEDED, message, revision)
            .await;
        resource.mark_applied(revision, message, is_destroy, entries);
        if is_destroy {
            resource.status.inventory = None;
        }
        Ok(())
    }
}
