//! strata-controller
//!
//! Reconciles declared infrastructure programs against a remote execution
//! engine: setup, drift detection, plan, apply, outputs and health checks,
//! plus the deletion path and the worker runtime that schedules passes.

pub mod apply;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod dependencies;
pub mod drift;
pub mod error;
pub mod finalizer;
pub mod health;
pub mod orchestrate;
pub mod outputs;
pub mod plan;
pub mod reconciler;
pub mod runtime;
pub mod setup;
pub mod source;
pub mod store;
pub mod telemetry;

pub use crate::cluster::{ClusterClient, ClusterError, Event, Severity};
pub use crate::config::{Config, LogFormat};
pub use crate::controller::Action;
pub use crate::error::ControllerError;
pub use crate::reconciler::Reconciler;
pub use crate::runtime::{QueueHandle, WorkerRuntime};
pub use crate::source::{Artifact, ArtifactSource, DirectorySource, SourceError};
pub use crate::store::InMemoryCluster;
