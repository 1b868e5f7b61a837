//! Request and reply types for the execution engine protocol.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_core::ManagedResource;
use strata_core::resource::FileLocation;

/// Handle to an engine-side instance bound to one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceHandle(pub String);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageReply {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAndExtractRequest {
    pub namespace: String,
    pub name: String,
    pub tarball: Vec<u8>,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAndExtractReply {
    pub working_dir: String,
    pub tmp_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteBackendConfigRequest {
    pub dir_path: String,
    pub backend_config: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCliConfigRequest {
    pub dir_path: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCliConfigReply {
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookPathRequest {
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookPathReply {
    pub exec_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInstanceRequest {
    pub working_dir: String,
    pub exec_path: String,
    /// Correlation id of the reconciliation pass.
    pub instance_id: String,
    pub resource: ManagedResource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInstanceReply {
    pub instance: InstanceHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetEnvRequest {
    pub instance: InstanceHandle,
    pub envs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMappingContent {
    pub location: FileLocation,
    pub path: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileMappingsRequest {
    pub working_dir: String,
    pub file_mappings: Vec<FileMappingContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVarsRequest {
    pub instance: InstanceHandle,
    pub working_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTemplatesRequest {
    pub working_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub instance: InstanceHandle,
    pub upgrade: bool,
    pub force_copy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectWorkspaceRequest {
    pub instance: InstanceHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceUnlockRequest {
    pub lock_identifier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub instance: InstanceHandle,
    /// Output slot; empty when no plan file can be persisted.
    pub out: String,
    pub refresh: bool,
    pub targets: Vec<String>,
    pub destroy: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReply {
    pub drifted: bool,
    /// False when a destroy plan had nothing to destroy.
    pub plan_created: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePlanRequest {
    pub instance: InstanceHandle,
    pub backend_completely_disabled: bool,
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub revision: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadPlanRequest {
    pub instance: InstanceHandle,
    pub name: String,
    pub namespace: String,
    pub backend_completely_disabled: bool,
    pub pending_plan: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub instance: InstanceHandle,
    pub parallelism: u32,
    pub refresh_before_apply: bool,
    pub targets: Vec<String>,
    /// Saved plan file to replay; empty applies the working directory.
    pub dir_or_plan: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyRequest {
    pub instance: InstanceHandle,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRequest {
    pub instance: InstanceHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReply {
    pub inventories: Vec<strata_core::InventoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMeta {
    #[serde(default)]
    pub sensitive: bool,
    #[serde(rename = "type", default)]
    pub kind: serde_json::Value,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputReply {
    pub outputs: BTreeMap<String, OutputMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutputsRequest {
    pub namespace: String,
    pub name: String,
    pub secret_name: String,
    pub uid: String,
    pub data: BTreeMap<String, Vec<u8>>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutputsReply {
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOutputsRequest {
    pub namespace: String,
    pub secret_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOutputsReply {
    pub outputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowPlanRequest {
    pub instance: InstanceHandle,
    pub plan_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowPlanReply {
    pub diff: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeSecretsRequest {
    pub namespace: String,
    pub name: String,
    pub workspace: String,
    pub has_outputs_secret: bool,
    pub outputs_secret_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupDirRequest {
    pub tmp_dir: String,
}
