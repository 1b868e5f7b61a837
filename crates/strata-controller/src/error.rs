use strata_core::CoreError;
use strata_engine::EngineError;
use thiserror::Error;

use crate::cluster::ClusterError;
use crate::source::SourceError;

/// Message carried by the drift sentinel.
pub const DRIFT_DETECTED: &str = "DriftDetected";

#[derive(Debug, Error)]
pub enum ControllerError {
    /// Drift was found and reported. Not a failure on its own; the caller
    /// decides whether to continue into plan and apply.
    #[error("{DRIFT_DETECTED}")]
    DriftDetected,

    #[error("{0}")]
    AccessDenied(String),

    #[error("{0}")]
    DependencyNotReady(String),

    /// A phase failed after recording its own condition.
    #[error("{0}")]
    Phase(String),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ControllerError {
    pub fn is_drift(&self) -> bool {
        matches!(self, Self::DriftDetected)
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied(_))
    }
}

/// Walk the full error chain and join all causes into one string.
pub fn format_err_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
