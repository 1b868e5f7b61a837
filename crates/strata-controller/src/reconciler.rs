use std::sync::Arc;

use jiff::Timestamp;
use strata_core::ManagedResource;
use strata_engine::Engine;

use crate::cluster::{ClusterClient, Event, Severity};
use crate::config::Config;
use crate::error::ControllerError;
use crate::source::ArtifactSource;

/// Carries every collaborator a reconciliation pass needs.
///
/// Cheap to clone; the worker runtime shares one across all passes.
#[derive(Clone)]
pub struct Reconciler {
    pub(crate) engine: Arc<dyn Engine>,
    pub(crate) cluster: Arc<dyn ClusterClient>,
    pub(crate) source: Arc<dyn ArtifactSource>,
    pub(crate) config: Config,
}

impl Reconciler {
    pub fn new(
        engine: Arc<dyn Engine>,
        cluster: Arc<dyn ClusterClient>,
        source: Arc<dyn ArtifactSource>,
        config: Config,
    ) -> Self {
        Self {
            engine,
            cluster,
            source,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cluster(&self) -> &Arc<dyn ClusterClient> {
        &self.cluster
    }

    pub(crate) async fn patch_status(&self, resource: &ManagedResource) -> Result<(), ControllerError> {
        self.cluster
            .patch_status(&resource.key(), &resource.status)
            .await
            .inspect_err(|e| tracing::error!(resource = %resource.key(), error = %e, "unable to update status"))?;
        Ok(())
    }

    /// Events are best effort: a failure is logged and swallowed.
    pub(crate) async fn event(
        &self,
        resource: &ManagedResource,
        severity: Severity,
        reason: &str,
        message: impl Into<String>,
        revision: &str,
    ) {
        let event = Event {
            object: resource.key(),
            severity,
            reason: reason.to_string(),
            message: message.into(),
            revision: revision.to_string(),
            timestamp: Timestamp::now(),
        };
        if let Err(e) = self.cluster.record_event(event).await {
            tracing::warn!(resource = %resource.key(), error = %e, "unable to record event");
        }
    }
}
