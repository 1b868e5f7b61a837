//! Working directory, backend and engine instance preparation.

use std::collections::BTreeMap;

use strata_core::resource::{EnvVar, KeyRef};
use strata_core::{ManagedResource, ObjectKey, hcl, reason};
use strata_engine::InstanceHandle;
use strata_engine::protocol::{
    CleanupDirRequest, CreateFileMappingsRequest, FileMappingContent, ForceUnlockRequest,
    GenerateTemplatesRequest, GenerateVarsRequest, InitRequest, LookPathRequest,
    NewInstanceRequest, ProcessCliConfigRequest, SelectWorkspaceRequest, SetEnvRequest,
    UploadAndExtractRequest, WriteBackendConfigRequest,
};

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::source::Artifact;

pub const EXECUTABLE: &str = "terraform";
pub const CLI_CONFIG_ENV: &str = "TF_CLI_CONFIG_FILE";

/// Unpacked source tree. `tmp_dir` must be released with
/// [`Reconciler::cleanup`] whatever happens afterwards.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub working_dir: String,
    pub tmp_dir: String,
}

/// An engine-side instance ready to plan.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub instance: InstanceHandle,
    pub working_dir: String,
}

/// Record `message` as the not-ready reason and turn it into a phase error.
pub(crate) fn not_ready(
    resource: &mut ManagedResource,
    revision: &str,
    reason: &str,
    message: String,
) -> ControllerError {
    resource.mark_not_ready(revision, reason, &message);
    ControllerError::Phase(message)
}

impl Reconciler {
    /// Download the artifact and unpack it on the engine side.
    pub(crate) async fn prepare_workspace(
        &self,
        resource: &mut ManagedResource,
        artifact: &Artifact,
    ) -> Result<Extracted, ControllerError> {
        let revision = artifact.revision.as_str();
        resource.mark_progressing("Initializing");
        self.patch_status(resource).await?;

        let tarball = self
            .source
            .fetch(artifact)
            .await
            .map_err(|e| not_ready(resource, revision, reason::ARTIFACT_FAILED, e.to_string()))?;

        let reply = self
            .engine
            .upload_and_extract(UploadAndExtractRequest {
                namespace: resource.namespace().to_string(),
                name: resource.name().to_string(),
                tarball,
                path: resource.spec.path.clone(),
            })
            .await
            .map_err(|e| not_ready(resource, revision, reason::ARTIFACT_FAILED, e.to_string()))?;

        tracing::debug!(
            resource = %resource.key(),
            working_dir = %reply.working_dir,
            "artifact extracted"
        );
        Ok(Extracted {
            working_dir: reply.working_dir,
            tmp_dir: reply.tmp_dir,
        })
    }

    /// Configure the backend and bind an engine instance to the unpacked
    /// tree, then release any lock the operator asked to break.
    pub(crate) async fn bind_instance(
        &self,
        resource: &mut ManagedResource,
        extracted: &Extracted,
        revision: &str,
        correlation_id: &str,
    ) -> Result<Workspace, ControllerError> {
        let key = resource.key();
        let working_dir = extracted.working_dir.clone();

        if let Some(backend_config) = hcl::backend_config(resource, self.config.disable_k8s_backend)? {
            let reply = self
                .engine
                .write_backend_config(WriteBackendConfigRequest {
                    dir_path: working_dir.clone(),
                    backend_config,
                })
                .await?;
            tracing::debug!(resource = %key, reply = %reply.message, "backend config written");
        }

        let mut envs = BTreeMap::new();
        if let Some(secret_ref) = resource.spec.cli_config_secret_ref.clone() {
            let namespace = secret_ref
                .namespace
                .clone()
                .unwrap_or_else(|| resource.namespace().to_string());
            if self.config.no_cross_namespace_refs && namespace != resource.namespace() {
                let msg = format!(
                    "cannot access secret {namespace}/{}, cross-namespace references have been disabled",
                    secret_ref.name
                );
                resource.mark_not_ready(revision, reason::ACCESS_DENIED, &msg);
                return Err(ControllerError::AccessDenied(msg));
            }
            let reply = self
                .engine
                .process_cli_config(ProcessCliConfigRequest {
                    dir_path: working_dir.clone(),
                    namespace,
                    name: secret_ref.name,
                })
                .await
                .map_err(|e| {
                    not_ready(
                        resource,
                        revision,
                        reason::NEW_FAILED,
                        format!("cannot process cli config: {e}"),
                    )
                })?;
            envs.insert(CLI_CONFIG_ENV.to_string(), reply.file_path);
        }

        let exec_path = self
            .engine
            .look_path(LookPathRequest {
                file: EXECUTABLE.to_string(),
            })
            .await
            .map_err(|e| {
                not_ready(
                    resource,
                    revision,
                    reason::NEW_FAILED,
                    format!("cannot find Terraform binary: {e}"),
                )
            })?
            .exec_path;

        let instance = self
            .engine
            .new_instance(NewInstanceRequest {
                working_dir: working_dir.clone(),
                exec_path,
                instance_id: correlation_id.to_string(),
                resource: resource.clone(),
            })
            .await
            .map_err(|e| {
                not_ready(
                    resource,
                    revision,
                    reason::NEW_FAILED,
                    format!("error creating engine instance: {e}"),
                )
            })?
            .instance;

        let declared = resource.spec.env.clone();
        match self.resolve_env(resource.namespace(), &declared).await {
            Ok(resolved) => envs.extend(resolved),
            Err(e) => {
                return Err(not_ready(
                    resource,
                    revision,
                    reason::INIT_FAILED,
                    format!("error getting valuesFrom document for Terraform: {e}"),
                ));
            }
        }
        self.engine
            .set_env(SetEnvRequest {
                instance: instance.clone(),
                envs,
            })
            .await
            .map_err(|e| {
                not_ready(
                    resource,
                    revision,
                    reason::INIT_FAILED,
                    format!("error setting env for Terraform: {e}"),
                )
            })?;

        if !resource.spec.file_mappings.is_empty() {
            let file_mappings = self.resolve_file_mappings(resource).await.map_err(|e| {
                not_ready(
                    resource,
                    revision,
                    reason::INIT_FAILED,
                    format!("error creating file mappings: {e}"),
                )
            })?;
            self.engine
                .create_file_mappings(CreateFileMappingsRequest {
                    working_dir: working_dir.clone(),
                    file_mappings,
                })
                .await
                .map_err(|e| {
                    not_ready(
                        resource,
                        revision,
                        reason::INIT_FAILED,
                        format!("error creating file mappings for Terraform: {e}"),
                    )
                })?;
        }

        self.engine
            .generate_vars(GenerateVarsRequest {
                instance: instance.clone(),
                working_dir: working_dir.clone(),
            })
            .await
            .map_err(|e| not_ready(resource, revision, reason::VARS_GENERATION_FAILED, e.to_string()))?;

        self.engine
            .generate_templates(GenerateTemplatesRequest {
                working_dir: working_dir.clone(),
            })
            .await
            .map_err(|e| {
                not_ready(resource, revision, reason::TEMPLATE_GENERATION_FAILED, e.to_string())
            })?;

        let init = self
            .engine
            .init(InitRequest {
                instance: instance.clone(),
                upgrade: resource.spec.upgrade_on_init,
                force_copy: !resource.backend_completely_disabled(),
            })
            .await;
        if let Err(e) = init {
            if let Some(lock_id) = &e.lock_identifier {
                resource.mark_state_locked(
                    lock_id,
                    &format!("Terraform Locked with Lock Identifier: {lock_id}"),
                );
            }
            return Err(not_ready(
                resource,
                revision,
                reason::INIT_FAILED,
                format!("error running Init: {e}"),
            ));
        }

        self.engine
            .select_workspace(SelectWorkspaceRequest {
                instance: instance.clone(),
            })
            .await
            .map_err(|e| not_ready(resource, revision, reason::WORKSPACE_SELECT_FAILED, e.to_string()))?;

        if let Some(lock_id) = resource.force_unlock_target().map(str::to_string) {
            tracing::info!(resource = %key, lock_id = %lock_id, "force unlocking state");
            self.engine
                .force_unlock(ForceUnlockRequest {
                    lock_identifier: lock_id.clone(),
                })
                .await?;
            resource.mark_force_unlocked(&format!(
                "Terraform Force Unlock with Lock Identifier: {lock_id}"
            ));
            self.patch_status(resource).await?;
        }

        Ok(Workspace {
            instance,
            working_dir,
        })
    }

    /// Release the engine-side scratch directory. Failures are only logged.
    pub(crate) async fn cleanup(&self, resource: &ObjectKey, tmp_dir: &str) {
        if tmp_dir.is_empty() {
            return;
        }
        match self
            .engine
            .cleanup_dir(CleanupDirRequest {
                tmp_dir: tmp_dir.to_string(),
            })
            .await
        {
            Ok(reply) => tracing::debug!(resource = %resource, reply = %reply.message, "clean up dir"),
            Err(e) => tracing::warn!(resource = %resource, error = %e, "clean up error"),
        }
    }

    /// Literal values, then secret and config map references, all read from
    /// the object's own namespace.
    async fn resolve_env(
        &self,
        namespace: &str,
        declared: &[EnvVar],
    ) -> Result<BTreeMap<String, String>, ControllerError> {
        let mut envs = BTreeMap::new();
        for var in declared {
            if !var.value.is_empty() {
                envs.insert(var.name.clone(), var.value.clone());
                continue;
            }
            let Some(source) = &var.value_from else {
                envs.insert(var.name.clone(), String::new());
                continue;
            };
            if let Some(key_ref) = &source.secret_key_ref {
                let value = self.secret_value(namespace, key_ref).await?;
                envs.insert(var.name.clone(), String::from_utf8_lossy(&value).into_owned());
            } else if let Some(key_ref) = &source.config_map_key_ref {
                let config_map = ObjectKey::new(namespace, &key_ref.name);
                let value = self
                    .cluster
                    .config_map_value(&config_map, &key_ref.key)
                    .await?
                    .ok_or_else(|| {
                        ControllerError::Phase(format!(
                            "key {:?} not found in config map {config_map}",
                            key_ref.key
                        ))
                    })?;
                envs.insert(var.name.clone(), value);
            }
        }
        Ok(envs)
    }

    async fn resolve_file_mappings(
        &self,
        resource: &ManagedResource,
    ) -> Result<Vec<FileMappingContent>, ControllerError> {
        let mut contents = Vec::with_capacity(resource.spec.file_mappings.len());
        for mapping in &resource.spec.file_mappings {
            let content = self
                .secret_value(resource.namespace(), &mapping.secret_key_ref)
                .await?;
            contents.push(FileMappingContent {
                location: mapping.location,
                path: mapping.path.clone(),
                content,
            });
        }
        Ok(contents)
    }

    async fn secret_value(&self, namespace: &str, key_ref: &KeyRef) -> Result<Vec<u8>, ControllerError> {
        let secret = ObjectKey::new(namespace, &key_ref.name);
        self.cluster
            .secret_value(&secret, &key_ref.key)
            .await?
            .ok_or_else(|| {
                ControllerError::Phase(format!("key {:?} not found in secret {secret}", key_ref.key))
            })
    }
}
