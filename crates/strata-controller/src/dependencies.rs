use strata_core::{ConditionType, ManagedResource, ObjectKey};

use crate::error::ControllerError;
use crate::reconciler::Reconciler;

/// Source identity with the namespace resolved against the owning object.
fn source_identity(resource: &ManagedResource) -> (&str, &str, &str) {
    let source = &resource.spec.source_ref;
    (
        source.kind.as_str(),
        source.namespace.as_deref().unwrap_or(resource.namespace()),
        source.name.as_str(),
    )
}

impl Reconciler {
    /// Ensure every declared dependency is ready for `revision`, recording
    /// this object as a dependent of each one along the way.
    pub(crate) async fn check_dependencies(
        &self,
        resource: &ManagedResource,
        revision: &str,
    ) -> Result<(), ControllerError> {
        let own = resource.key();
        for dep_ref in &resource.spec.depends_on {
            let dep_key = resource.dependency_key(dep_ref);
            if self.config.no_cross_namespace_refs && dep_key.namespace != own.namespace {
                return Err(ControllerError::AccessDenied(format!(
                    "cannot access {dep_key}, cross-namespace references have been disabled"
                )));
            }

            let dependency = match self.cluster.get(&dep_key).await {
                Ok(Some(dependency)) => dependency,
                Ok(None) => {
                    return Err(ControllerError::DependencyNotReady(format!(
                        "unable to get '{dep_key}' dependency: not found"
                    )));
                }
                Err(e) => {
                    return Err(ControllerError::DependencyNotReady(format!(
                        "unable to get '{dep_key}' dependency: {e}"
                    )));
                }
            };

            if !dependency.is_being_deleted()
                && !dependency.metadata.finalizers.dependents.contains(&own)
            {
                self.cluster.add_dependent(&dep_key, &own).await.map_err(|e| {
                    ControllerError::DependencyNotReady(format!(
                        "unable to add finalizer to '{dep_key}' dependency: {e}"
                    ))
                })?;
                tracing::debug!(resource = %own, dependency = %dep_key, "dependent edge added");
            }

            if dependency.generation() != dependency.status.observed_generation
                || !dependency.status.conditions.is_true(ConditionType::Ready)
            {
                return Err(ControllerError::DependencyNotReady(format!(
                    "dependency '{dep_key}' is not ready"
                )));
            }

            let status = &dependency.status;
            if source_identity(&dependency) == source_identity(resource)
                && revision != status.last_applied_revision
                && revision != status.last_planned_revision
            {
                return Err(ControllerError::DependencyNotReady(format!(
                    "dependency '{dep_key}' is not updated yet"
                )));
            }

            if let Some(target) = &dependency.spec.write_outputs_to_secret {
                let secret = ObjectKey::new(dependency.namespace(), &target.name);
                match self
                    .output_secret_exists(dependency.namespace(), &target.name)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        return Err(ControllerError::DependencyNotReady(format!(
                            "dependency output secret: '{secret}' of '{dep_key}' is not ready yet"
                        )));
                    }
                    Err(e) => {
                        tracing::warn!(
                            resource = %own,
                            dependency = %dep_key,
                            secret = %secret,
                            error = %e,
                            "unable to check dependency output secret"
                        );
                        return Err(ControllerError::DependencyNotReady(format!(
                            "unable to check output secret '{secret}' of '{dep_key}': {e}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
