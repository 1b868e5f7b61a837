//! In-process cluster store.
//!
//! Backs the standalone binary and the integration tests. Objects follow the
//! usual API-server rules: a spec change bumps the generation, deletion only
//! stamps a deletion timestamp, and the object is removed once its last
//! finalizer is gone.

use std::collections::{BTreeMap, VecDeque};

use jiff::Timestamp;
use strata_core::resource::ResourceSpec;
use strata_core::{ManagedResource, ObjectKey, ResourceStatus};
use strata_engine::BoxFuture;
use tokio::sync::{Mutex, broadcast};

use crate::cluster::{ClusterClient, ClusterError, Event};

const CHANGE_BUFFER: usize = 1024;
/// Recorded events kept in memory; the oldest are dropped first.
pub const EVENT_BUFFER: usize = 1024;

#[derive(Default)]
struct ClusterState {
    resources: BTreeMap<ObjectKey, ManagedResource>,
    secrets: BTreeMap<ObjectKey, BTreeMap<String, Vec<u8>>>,
    config_maps: BTreeMap<ObjectKey, BTreeMap<String, String>>,
    events: VecDeque<Event>,
}

pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
    changes: broadcast::Sender<ObjectKey>,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            state: Mutex::new(ClusterState::default()),
            changes,
        }
    }

    /// Keys of objects whose spec or deletion state changed.
    pub fn subscribe(&self) -> broadcast::Receiver<ObjectKey> {
        self.changes.subscribe()
    }

    /// Create an object, or replace the spec, labels and annotations of an
    /// existing one.
    pub async fn apply(&self, mut resource: ManagedResource) -> ObjectKey {
        let key = resource.key();
        let mut state = self.state.lock().await;
        match state.resources.get_mut(&key) {
            Some(existing) => {
                if existing.spec != resource.spec {
                    existing.metadata.generation += 1;
                    existing.spec = resource.spec;
                }
                existing.metadata.labels = resource.metadata.labels;
                existing.metadata.annotations = resource.metadata.annotations;
            }
            None => {
                if resource.metadata.uid.is_empty() {
                    resource.metadata.uid = uuid::Uuid::new_v4().to_string();
                }
                if resource.metadata.generation == 0 {
                    resource.metadata.generation = 1;
                }
                state.resources.insert(key.clone(), resource);
            }
        }
        drop(state);
        self.notify(&key);
        key
    }

    pub async fn update_spec<F>(&self, key: &ObjectKey, update: F) -> Result<(), ClusterError>
    where
        F: FnOnce(&mut ResourceSpec),
    {
        let mut state = self.state.lock().await;
        let resource = state
            .resources
            .get_mut(key)
            .ok_or_else(|| ClusterError::NotFound(key.clone()))?;
        let before = resource.spec.clone();
        update(&mut resource.spec);
        if resource.spec != before {
            resource.metadata.generation += 1;
        }
        drop(state);
        self.notify(key);
        Ok(())
    }

    /// Request deletion. Objects without finalizers vanish immediately.
    pub async fn delete(&self, key: &ObjectKey) -> Result<(), ClusterError> {
        let mut state = self.state.lock().await;
        let resource = state
            .resources
            .get_mut(key)
            .ok_or_else(|| ClusterError::NotFound(key.clone()))?;
        if resource.metadata.deletion_timestamp.is_none() {
            resource.metadata.deletion_timestamp = Some(Timestamp::now());
        }
        collect(&mut state, key);
        drop(state);
        self.notify(key);
        Ok(())
    }

    pub async fn resource(&self, key: &ObjectKey) -> Option<ManagedResource> {
        self.state.lock().await.resources.get(key).cloned()
    }

    pub async fn put_secret(&self, key: ObjectKey, data: BTreeMap<String, Vec<u8>>) {
        self.state.lock().await.secrets.insert(key, data);
    }

    pub async fn secret(&self, key: &ObjectKey) -> Option<BTreeMap<String, Vec<u8>>> {
        self.state.lock().await.secrets.get(key).cloned()
    }

    pub async fn put_config_map(&self, key: ObjectKey, data: BTreeMap<String, String>) {
        self.state.lock().await.config_maps.insert(key, data);
    }

    pub async fn events(&self) -> Vec<Event> {
        self.state.lock().await.events.iter().cloned().collect()
    }

    pub async fn events_for(&self, key: &ObjectKey) -> Vec<Event> {
        self.state
            .lock()
            .await
            .events
            .iter()
            .filter(|e| &e.object == key)
            .cloned()
            .collect()
    }

    fn notify(&self, key: &ObjectKey) {
        // No subscribers is fine.
        let _ = self.changes.send(key.clone());
    }
}

/// Drop a deleting object once nothing holds it.
fn collect(state: &mut ClusterState, key: &ObjectKey) -> bool {
    let removable = state.resources.get(key).is_some_and(|r| {
        r.metadata.deletion_timestamp.is_some() && r.metadata.finalizers.is_empty()
    });
    if removable {
        state.resources.remove(key);
        tracing::debug!(resource = %key, "object removed");
    }
    removable
}

impl ClusterClient for InMemoryCluster {
    fn get<'a>(
        &'a self,
        key: &'a ObjectKey,
    ) -> BoxFuture<'a, Result<Option<ManagedResource>, ClusterError>> {
        Box::pin(async move { Ok(self.resource(key).await) })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<ObjectKey>, ClusterError>> {
        Box::pin(async move { Ok(self.state.lock().await.resources.keys().cloned().collect()) })
    }

    fn patch_status<'a>(
        &'a self,
        key: &'a ObjectKey,
        status: &'a ResourceStatus,
    ) -> BoxFuture<'a, Result<(), ClusterError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let resource = state
                .resources
                .get_mut(key)
                .ok_or_else(|| ClusterError::NotFound(key.clone()))?;
            resource.status = status.clone();
            Ok(())
        })
    }

    fn set_controller_finalizer<'a>(
        &'a self,
        key: &'a ObjectKey,
        present: bool,
    ) -> BoxFuture<'a, Result<(), ClusterError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let resource = state
                .resources
                .get_mut(key)
                .ok_or_else(|| ClusterError::NotFound(key.clone()))?;
            resource.metadata.finalizers.controller = present;
            collect(&mut state, key);
            Ok(())
        })
    }

    fn add_dependent<'a>(
        &'a self,
        dependency: &'a ObjectKey,
        dependent: &'a ObjectKey,
    ) -> BoxFuture<'a, Result<(), ClusterError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let resource = state
                .resources
                .get_mut(dependency)
                .ok_or_else(|| ClusterError::NotFound(dependency.clone()))?;
            if resource.is_being_deleted() {
                return Err(ClusterError::Conflict(format!(
                    "{dependency} is being deleted"
                )));
            }
            resource.metadata.finalizers.dependents.insert(dependent.clone());
            Ok(())
        })
    }

    fn remove_dependent<'a>(
        &'a self,
        dependency: &'a ObjectKey,
        dependent: &'a ObjectKey,
    ) -> BoxFuture<'a, Result<(), ClusterError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let Some(resource) = state.resources.get_mut(dependency) else {
                return Ok(());
            };
            if !resource.metadata.finalizers.dependents.remove(dependent) {
                return Ok(());
            }
            collect(&mut state, dependency);
            drop(state);
            self.notify(dependency);
            Ok(())
        })
    }

    fn secret_value<'a>(
        &'a self,
        secret: &'a ObjectKey,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<u8>>, ClusterError>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let data = state
                .secrets
                .get(secret)
                .ok_or_else(|| ClusterError::NotFound(secret.clone()))?;
            Ok(data.get(key).cloned())
        })
    }

    fn config_map_value<'a>(
        &'a self,
        config_map: &'a ObjectKey,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, ClusterError>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let data = state
                .config_maps
                .get(config_map)
                .ok_or_else(|| ClusterError::NotFound(config_map.clone()))?;
            Ok(data.get(key).cloned())
        })
    }

    fn record_event(&self, event: Event) -> BoxFuture<'_, Result<(), ClusterError>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.events.len() == EVENT_BUFFER {
                state.events.pop_front();
            }
            state.events.push_back(event);
            Ok(())
        })
    }
}
