//! The controller's view of the cluster API.

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strata_core::{ManagedResource, ObjectKey, ResourceStatus};
use strata_engine::BoxFuture;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{0} not found")]
    NotFound(ObjectKey),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Other(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// A human-readable notification attached to an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub object: ObjectKey,
    pub severity: Severity,
    pub reason: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
    pub timestamp: Timestamp,
}

/// Object reads, status writes, finalizer bookkeeping and events.
///
/// Status is always replaced wholesale; a status patch never touches spec or
/// metadata.
pub trait ClusterClient: Send + Sync {
    fn get<'a>(
        &'a self,
        key: &'a ObjectKey,
    ) -> BoxFuture<'a, Result<Option<ManagedResource>, ClusterError>>;

    fn list(&self) -> BoxFuture<'_, Result<Vec<ObjectKey>, ClusterError>>;

    fn patch_status<'a>(
        &'a self,
        key: &'a ObjectKey,
        status: &'a ResourceStatus,
    ) -> BoxFuture<'a, Result<(), ClusterError>>;

    /// Add or remove this controller's finalizer. An object being deleted
    /// disappears once its last finalizer is gone.
    fn set_controller_finalizer<'a>(
        &'a self,
        key: &'a ObjectKey,
        present: bool,
    ) -> BoxFuture<'a, Result<(), ClusterError>>;

    /// Record on `dependency` that `dependent` depends on it.
    fn add_dependent<'a>(
        &'a self,
        dependency: &'a ObjectKey,
        dependent: &'a ObjectKey,
    ) -> BoxFuture<'a, Result<(), ClusterError>>;

    fn remove_dependent<'a>(
        &'a self,
        dependency: &'a ObjectKey,
        dependent: &'a ObjectKey,
    ) -> BoxFuture<'a, Result<(), ClusterError>>;

    fn secret_value<'a>(
        &'a self,
        secret: &'a ObjectKey,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<Vec<u8>>, ClusterError>>;

    fn config_map_value<'a>(
        &'a self,
        config_map: &'a ObjectKey,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, ClusterError>>;

    fn record_event(&self, event: Event) -> BoxFuture<'_, Result<(), ClusterError>>;
}
