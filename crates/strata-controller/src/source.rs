//! Where configuration artifacts come from.
//!
//! Fetching and verifying sources is someone else's job; the controller only
//! needs the current revision and the tarball bytes.

use std::io;
use std::path::{Path, PathBuf};

use strata_core::ManagedResource;
use strata_engine::BoxFuture;
use thiserror::Error;

pub const TARBALL_FILE: &str = "artifact.tar.gz";
pub const REVISION_FILE: &str = "revision";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source '{0}' not found")]
    NotFound(String),

    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A resolved artifact: the revision it carries and where its bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub revision: String,
    pub location: String,
}

pub trait ArtifactSource: Send + Sync {
    /// `Ok(None)` means the source exists but has no artifact yet.
    fn resolve<'a>(
        &'a self,
        resource: &'a ManagedResource,
    ) -> BoxFuture<'a, Result<Option<Artifact>, SourceError>>;

    fn fetch<'a>(&'a self, artifact: &'a Artifact) -> BoxFuture<'a, Result<Vec<u8>, SourceError>>;
}

/// Serves artifacts from `<root>/<namespace>/<name>/`, where each source
/// directory holds `artifact.tar.gz` and a `revision` file.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactSource for DirectorySource {
    fn resolve<'a>(
        &'a self,
        resource: &'a ManagedResource,
    ) -> BoxFuture<'a, Result<Option<Artifact>, SourceError>> {
        Box::pin(async move {
            let source = &resource.spec.source_ref;
            let namespace = source.namespace.as_deref().unwrap_or(resource.namespace());
            let dir = self.root.join(namespace).join(&source.name);
            if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
                return Err(SourceError::NotFound(format!(
                    "{}/{namespace}/{}",
                    source.kind, source.name
                )));
            }

            let tarball = dir.join(TARBALL_FILE);
            let revision_path = dir.join(REVISION_FILE);
            let revision = match tokio::fs::read_to_string(&revision_path).await {
                Ok(revision) => revision.trim().to_string(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(source) => {
                    return Err(SourceError::Io {
                        path: revision_path.display().to_string(),
                        source,
                    });
                }
            };
            if revision.is_empty() || !tokio::fs::try_exists(&tarball).await.unwrap_or(false) {
                return Ok(None);
            }

            Ok(Some(Artifact {
                revision,
                location: tarball.display().to_string(),
            }))
        })
    }

    fn fetch<'a>(&'a self, artifact: &'a Artifact) -> BoxFuture<'a, Result<Vec<u8>, SourceError>> {
        Box::pin(async move {
            tokio::fs::read(&artifact.location)
                .await
                .map_err(|source| SourceError::Io {
                    path: artifact.location.clone(),
                    source,
                })
        })
    }
}
