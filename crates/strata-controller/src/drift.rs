use strata_core::{ManagedResource, reason};
use strata_engine::protocol::{PlanRequest, ShowPlanRequest};

use crate::cluster::Severity;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::setup::{Workspace, not_ready};

/// Separate from the real plan slot so a pending plan is never overwritten.
pub const DRIFT_FILE: &str = "tfdrift";

const OUTPUT_ONLY_TRAILER: &str = "You can apply this plan to save these new output values to the Terraform\nstate, without changing any real infrastructure.";

impl Reconciler {
    /// Run a refresh-only plan. Drift is recorded on the resource and
    /// reported as [`ControllerError::DriftDetected`].
    pub(crate) async fn detect_drift(
        &self,
        resource: &mut ManagedResource,
        workspace: &Workspace,
        revision: &str,
    ) -> Result<(), ControllerError> {
        let key = resource.key();
        tracing::info!(resource = %key, revision, "detecting drift");

        let disabled = resource.backend_completely_disabled();
        let reply = match self
            .engine
            .plan(PlanRequest {
                instance: workspace.instance.clone(),
                out: if disabled { String::new() } else { DRIFT_FILE.to_string() },
                refresh: true,
                targets: resource.spec.targets.clone(),
                destroy: false,
            })
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                self.report_locked(resource, &e, "Drift detection", revision)
                    .await;
                return Err(not_ready(
                    resource,
                    revision,
                    reason::DRIFT_DETECTION_FAILED,
                    format!("error running Plan: {e}"),
                ));
            }
        };

        if !reply.drifted {
            resource.mark_no_drift(revision, "No drift");
            return Ok(());
        }

        let diff = if disabled {
            "not available".to_string()
        } else {
            self.engine
                .show_plan_diff(ShowPlanRequest {
                    instance: workspace.instance.clone(),
                    plan_file: DRIFT_FILE.to_string(),
                })
                .await
                .map_err(|e| {
                    not_ready(resource, revision, reason::DRIFT_DETECTION_FAILED, e.to_string())
                })?
                .diff
        };
        let diff = diff.replacen(OUTPUT_ONLY_TRAILER, "", 1);
        tracing::info!(resource = %key, revision, "drift detected");

        self.event(
            resource,
            Severity::Error,
            reason::DRIFT_DETECTED,
            format!("Drift detected.\n{diff}"),
            revision,
        )
        .await;
        resource.mark_drift_detected(revision, &diff);
        Err(ControllerError::DriftDetected)
    }
}
