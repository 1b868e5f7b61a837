use std::time::Duration;

use strata_core::transition::NO_OBJECTS_TO_DESTROY;
use strata_core::{ConditionType, ManagedResource, reason};
use strata_engine::protocol::FinalizeSecretsRequest;

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::source::Artifact;

const FINALIZE_SECRETS_BACKOFF: Duration = Duration::from_millis(500);

impl Reconciler {
    /// Tear down an object that is being deleted: destroy what it manages
    /// when asked to, drop its secrets, then release its finalizer and the
    /// edges it holds on its dependencies.
    pub(crate) async fn finalize(
        &self,
        resource: &mut ManagedResource,
        artifact: Option<&Artifact>,
    ) -> Result<(), ControllerError> {
        let key = resource.key();

        if resource.spec.destroy_resources_on_deletion {
            match artifact {
                Some(artifact) => self.destroy_on_deletion(resource, artifact).await?,
                None => tracing::warn!(
                    resource = %key,
                    "no artifact available, skipping destroy on deletion"
                ),
            }
        }

        self.finalize_secrets(resource).await?;

        self.cluster.set_controller_finalizer(&key, false).await?;
        for dep_ref in &resource.spec.depends_on {
            let dep_key = resource.dependency_key(dep_ref);
            self.cluster.remove_dependent(&dep_key, &key).await?;
            tracing::debug!(resource = %key, dependency = %dep_key, "dependent edge removed");
        }

        tracing::info!(resource = %key, "finalized");
        Ok(())
    }

    async fn destroy_on_deletion(
        &self,
        resource: &mut ManagedResource,
        artifact: &Artifact,
    ) -> Result<(), ControllerError> {
        let key = resource.key();
        let revision = artifact.revision.as_str();
        let correlation_id = uuid::Uuid::new_v4().to_string();

        let extracted = self.prepare_workspace(resource, artifact).await?;
        let outcome = async {
            let workspace = self
                .bind_instance(resource, &extracted, revision, &correlation_id)
                .await?;

            // The deletion timestamp turns this into a destroy plan.
            self.plan(resource, &workspace, revision).await?;
            self.patch_status(resource).await?;

            let conditions = &resource.status.conditions;
            let nothing_to_destroy = conditions.reason(ConditionType::Plan)
                == Some(reason::PLANNED_NO_CHANGES)
                && conditions
                    .get(ConditionType::Plan)
                    .is_some_and(|c| c.message == NO_OBJECTS_TO_DESTROY);
            if nothing_to_destroy {
                tracing::info!(resource = %key, "nothing to destroy");
                return Ok(());
            }

            self.apply(resource, &workspace, revision).await?;
            self.patch_status(resource).await
        }
        .await;

        self.cleanup(&key, &extracted.tmp_dir).await;
        if outcome.is_ok() {
            tracing::info!(resource = %key, "finalizing destroyResourcesOnDeletion: ok");
        }
        outcome
    }

    /// Missing secrets are fine. Transient engine failures are retried a
    /// bounded number of times.
    async fn finalize_secrets(&self, resource: &ManagedResource) -> Result<(), ControllerError> {
        let key = resource.key();
        let target = resource
            .spec
            .write_outputs_to_secret
            .as_ref()
            .filter(|t| !t.name.is_empty());
        let request = FinalizeSecretsRequest {
            namespace: resource.namespace().to_string(),
            name: resource.name().to_string(),
            workspace: resource.workspace_name().to_string(),
            has_outputs_secret: target.is_some(),
            outputs_secret_name: target.map(|t| t.name.clone()).unwrap_or_default(),
        };

        let attempts = self.config.finalize_secrets_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.engine.finalize_secrets(request.clone()).await {
                Ok(reply) => {
                    tracing::info!(resource = %key, reply = %reply.message, "finalizing secrets");
                    return Ok(());
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!(resource = %key, "secrets already gone");
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::warn!(
                        resource = %key,
                        attempt,
                        error = %e,
                        "transient error finalizing secrets, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(FINALIZE_SECRETS_BACKOFF).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
