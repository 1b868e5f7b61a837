//! The per-object entry point: admission checks in front of the phase
//! orchestrator, and the requeue decision after it.

use std::time::{Duration, Instant};

use jiff::Timestamp;
use strata_core::{ConditionStatus, ConditionType, ManagedResource, ObjectKey, reason};

use crate::cluster::Severity;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::source::Artifact;

/// What the runtime should do with an object after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Action {
    pub requeue_after: Option<Duration>,
    pub requeue_now: bool,
}

impl Action {
    /// Wait for the next change notification.
    pub fn await_change() -> Self {
        Self::default()
    }

    pub fn requeue_now() -> Self {
        Self {
            requeue_after: None,
            requeue_now: true,
        }
    }

    pub fn requeue_after(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
            requeue_now: false,
        }
    }
}

impl Reconciler {
    /// Reconcile the object at `key` once.
    ///
    /// Phase failures are recorded on the object and turned into a delayed
    /// requeue; only failures to talk to the cluster surface as errors.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ControllerError> {
        let Some(mut resource) = self.cluster.get(key).await? else {
            tracing::debug!(resource = %key, "object gone, nothing to do");
            return Ok(Action::await_change());
        };

        let started = Instant::now();
        tracing::info!(resource = %key, generation = resource.generation(), "reconciliation started");
        let action = self.reconcile_resource(&mut resource).await;

        if resource.status.conditions.is_true(ConditionType::Ready) {
            resource.status.observed_generation = resource.generation();
        }
        match self.cluster.patch_status(key, &resource.status).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() && resource.is_being_deleted() => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            resource = %key,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "reconciliation finished"
        );
        action
    }

    async fn reconcile_resource(
        &self,
        resource: &mut ManagedResource,
    ) -> Result<Action, ControllerError> {
        let key = resource.key();

        if !resource.metadata.finalizers.controller && !resource.is_being_deleted() {
            self.cluster.set_controller_finalizer(&key, true).await?;
            resource.metadata.finalizers.controller = true;
            return Ok(Action::requeue_now());
        }

        if resource.spec.suspend {
            tracing::info!(resource = %key, "reconciliation is suspended for this object");
            return Ok(Action::await_change());
        }

        let (should_reconcile, requeue_after) = resource.should_reconcile(Timestamp::now());
        if !should_reconcile {
            tracing::info!(
                resource = %key,
                requeue_after_secs = requeue_after.as_secs(),
                "skipping reconciliation, interval has not elapsed since last plan"
            );
            return Ok(Action::requeue_after(requeue_after));
        }

        if resource.is_being_deleted() && !resource.metadata.finalizers.dependents.is_empty() {
            let names: Vec<String> = resource
                .metadata
                .finalizers
                .dependents
                .iter()
                .map(|d| d.name.clone())
                .collect();
            let msg = format!(
                "Deletion in progress, but blocked. Please delete {} to resume ...",
                names.join(", ")
            );
            resource.mark_not_ready("", reason::DELETION_BLOCKED_BY_DEPENDANTS, &msg);
            self.patch_status(resource).await?;
            return Ok(Action::requeue_after(resource.retry_interval()));
        }

        let artifact = match self.resolve_source(resource).await {
            Ok(artifact) => artifact,
            Err(action) if !resource.is_being_deleted() => return Ok(action),
            Err(_) => None,
        };

        if resource.is_being_deleted() {
            return self.run_finalizer(resource, artifact.as_ref()).await;
        }
        let Some(artifact) = artifact else {
            return Ok(Action::requeue_after(resource.retry_interval()));
        };
        let revision = artifact.revision.clone();

        if !resource.spec.depends_on.is_empty() {
            match self.check_dependencies(resource, &revision).await {
                Ok(()) => tracing::info!(resource = %key, "all dependencies are ready"),
                Err(e) if e.is_access_denied() => {
                    resource.mark_not_ready(&revision, reason::ACCESS_DENIED, &e.to_string());
                    self.patch_status(resource).await?;
                    return Ok(Action::await_change());
                }
                Err(e) => {
                    resource.mark_not_ready(&revision, reason::DEPENDENCY_NOT_READY, &e.to_string());
                    self.patch_status(resource).await?;
                    let retry = resource.retry_interval();
                    let msg = format!(
                        "Dependencies do not meet ready condition, retrying in {retry:?}"
                    );
                    tracing::info!(resource = %key, "{msg}");
                    self.event(resource, Severity::Info, reason::DEPENDENCY_NOT_READY, msg, &revision)
                        .await;
                    return Ok(Action::requeue_after(retry));
                }
            }
        }
        resume_if_blocked(resource, &[reason::ACCESS_DENIED, reason::DEPENDENCY_NOT_READY]);

        if resource.status.conditions.status(ConditionType::Ready) != Some(ConditionStatus::Unknown) {
            resource.mark_progressing("Reconciliation in progress");
            self.patch_status(resource).await?;
        }

        let revision_changed = revision != resource.status.last_attempted_revision;
        let generation_changed = resource.generation() != resource.status.observed_generation;
        if revision_changed || generation_changed {
            tracing::info!(resource = %key, "reset reconciliation failures count, resource changed");
            resource.reset_retry();
            self.patch_status(resource).await?;
        }

        // A plan-only object replans every new revision.
        if revision_changed && resource.spec.plan_only && !resource.status.plan.pending.is_empty() {
            tracing::info!(resource = %key, "new revision in plan only mode, clearing pending plan");
            resource.status.plan.pending.clear();
            self.patch_status(resource).await?;
        }

        if !resource.status.plan.pending.is_empty()
            && resource.awaits_approval()
            && !resource.should_apply()
        {
            tracing::info!(resource = %key, "reconciliation is stopped to wait for a manual approve");
            return Ok(Action::await_change());
        }

        if !resource.should_retry() {
            tracing::info!(
                resource = %key,
                failures = resource.status.reconciliation_failures,
                generation = resource.generation(),
                "resource reached maximum number of retries"
            );
            resource.mark_retry_limit_reached();
            return Ok(Action::await_change());
        }

        let outcome = self.run_phases(resource, &artifact).await;
        if outcome.is_ok() {
            resource.reset_retry();
        } else {
            resource.increment_failures();
        }
        self.patch_status(resource).await?;

        let retry = resource.retry_interval();
        match outcome {
            Err(e) if e.is_drift() => {
                tracing::warn!(
                    resource = %key,
                    revision = %revision,
                    retry_secs = retry.as_secs(),
                    "drift detected, next try after retry interval"
                );
                Ok(Action::requeue_after(retry))
            }
            Err(e) => {
                tracing::error!(
                    resource = %key,
                    revision = %revision,
                    failures = resource.status.reconciliation_failures,
                    retry_secs = retry.as_secs(),
                    error = %e,
                    "reconciliation failed"
                );
                self.event(resource, Severity::Error, reason::RECONCILIATION_FAILURE, e.to_string(), &revision)
                    .await;
                Ok(Action::requeue_after(retry))
            }
            Ok(()) if !resource.status.plan.pending.is_empty() && resource.awaits_approval() => {
                tracing::info!(resource = %key, "reconciliation is stopped to wait for manual operations");
                Ok(Action::await_change())
            }
            Ok(()) => {
                tracing::info!(resource = %key, generation = resource.generation(), "reconciliation completed");
                Ok(Action::requeue_after(resource.interval()))
            }
        }
    }

    /// Resolve the source artifact. `Err` carries the action to return when
    /// the object cannot proceed; its `Ready` condition is already set.
    async fn resolve_source(&self, resource: &mut ManagedResource) -> Result<Option<Artifact>, Action> {
        let key = resource.key();
        let source = &resource.spec.source_ref;
        if let Some(namespace) = &source.namespace {
            if self.config.no_cross_namespace_refs && namespace != resource.namespace() {
                let msg = format!(
                    "cannot access {}/{namespace}/{}, cross-namespace references have been disabled",
                    source.kind, source.name
                );
                tracing::warn!(resource = %key, "{msg}");
                resource.mark_not_ready("", reason::ACCESS_DENIED, &msg);
                self.event(resource, Severity::Error, reason::ACCESS_DENIED, msg, "")
                    .await;
                return Err(Action::await_change());
            }
        }

        let resolved = match self.source.resolve(resource).await {
            Ok(resolved) => resolved,
            Err(e) if e.is_not_found() => {
                let msg = e.to_string();
                resource.mark_not_ready("", reason::ARTIFACT_FAILED, &msg);
                self.event(resource, Severity::Error, reason::ARTIFACT_FAILED, msg, "")
                    .await;
                return Err(Action::requeue_after(resource.retry_interval()));
            }
            Err(e) => {
                let msg = format!("could not get Source object: {e}");
                tracing::error!(resource = %key, "{msg}");
                resource.mark_not_ready("", reason::ARTIFACT_FAILED, &msg);
                return Err(Action::requeue_after(resource.retry_interval()));
            }
        };
        resume_if_blocked(resource, &[reason::ACCESS_DENIED, reason::ARTIFACT_FAILED]);

        if resolved.is_none() {
            let msg = "Source is not ready, artifact not found";
            tracing::info!(resource = %key, "{msg}");
            resource.mark_not_ready("", reason::ARTIFACT_FAILED, msg);
            return Err(Action::requeue_after(resource.retry_interval()));
        }
        Ok(resolved)
    }

    async fn run_finalizer(
        &self,
        resource: &mut ManagedResource,
        artifact: Option<&Artifact>,
    ) -> Result<Action, ControllerError> {
        let key = resource.key();
        let revision = artifact.map(|a| a.revision.clone()).unwrap_or_default();
        if resource.status.conditions.status(ConditionType::Ready) != Some(ConditionStatus::Unknown) {
            resource.mark_progressing("Deletion in progress");
            self.patch_status(resource).await?;
        }

        match self.finalize(resource, artifact).await {
            Ok(()) => Ok(Action::await_change()),
            Err(e) => {
                tracing::error!(resource = %key, error = %e, "finalization failed");
                self.event(resource, Severity::Error, reason::RECONCILIATION_FAILURE, e.to_string(), &revision)
                    .await;
                Ok(Action::requeue_after(resource.retry_interval()))
            }
        }
    }
}

/// A blocking reason cleared on this pass goes back to progressing.
fn resume_if_blocked(resource: &mut ManagedResource, reasons: &[&str]) {
    if resource
        .status
        .conditions
        .has_any_reason(ConditionType::Ready, reasons)
    {
        resource.status.conditions.set(
            ConditionType::Ready,
            ConditionStatus::Unknown,
            reason::PROGRESSING,
            "Reconciliation in progress",
        );
    }
}
