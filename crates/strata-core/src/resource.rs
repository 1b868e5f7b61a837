use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use crate::status::ResourceStatus;

pub const DEFAULT_WORKSPACE_NAME: &str = "default";

/// Namespace-qualified object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Deletion guards attached to an object.
///
/// `controller` is this controller's own guard. `dependents` is the
/// depended-by edge set: every resource listed there declared a dependency on
/// this object and must be gone before this object may be removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finalizers {
    #[serde(default)]
    pub controller: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dependents: BTreeSet<ObjectKey>,
}

impl Finalizers {
    pub fn is_empty(&self) -> bool {
        !self.controller && self.dependents.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub generation: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Finalizers::is_empty")]
    pub finalizers: Finalizers,
}

/// The user-declared infrastructure program and its observed status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagedResource {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ResourceSpec,
    #[serde(default)]
    pub status: ResourceStatus,
}

impl ManagedResource {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn generation(&self) -> i64 {
        self.metadata.generation
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn workspace_name(&self) -> &str {
        if self.spec.workspace.is_empty() {
            DEFAULT_WORKSPACE_NAME
        } else {
            &self.spec.workspace
        }
    }

    /// Cloud execution or an explicitly disabled backend leaves no
    /// persisted plan file to replay.
    pub fn backend_completely_disabled(&self) -> bool {
        self.spec.cloud.is_some()
            || self
                .spec
                .backend_config
                .as_ref()
                .is_some_and(|backend| backend.disable)
    }

    /// Resolve a dependency reference against this object's namespace.
    pub fn dependency_key(&self, dep: &DependencyRef) -> ObjectKey {
        ObjectKey::new(
            dep.namespace.as_deref().unwrap_or(self.namespace()),
            &dep.name,
        )
    }
}

/// Approval mode for pending plans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApprovePlan {
    /// Plans wait for an operator to supply their identifier.
    #[default]
    Manual,
    Auto,
    /// Drift detection only; plan and apply never run.
    Disable,
    /// A full plan identifier or a left-anchored prefix of one.
    Plan(String),
}

impl ApprovePlan {
    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Manual)
    }
}

impl From<String> for ApprovePlan {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" => Self::Manual,
            "auto" => Self::Auto,
            "disable" => Self::Disable,
            _ => Self::Plan(value),
        }
    }
}

impl From<ApprovePlan> for String {
    fn from(value: ApprovePlan) -> Self {
        match value {
            ApprovePlan::Manual => String::new(),
            ApprovePlan::Auto => "auto".to_string(),
            ApprovePlan::Disable => "disable".to_string(),
            ApprovePlan::Plan(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryStrategy {
    #[default]
    StaticInterval,
    ExponentialBackoff,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remediation {
    /// Negative means retry forever.
    #[serde(default)]
    pub retries: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRef {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<KeyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_key_ref: Option<KeyRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<EnvVarSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileLocation {
    Home,
    Workspace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMapping {
    pub location: FileLocation,
    pub path: String,
    pub secret_key_ref: KeyRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfigSpec {
    #[serde(default)]
    pub disable: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_suffix: String,
    #[serde(default)]
    pub in_cluster_config: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub custom_configuration: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub config_path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudWorkspaces {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSpec {
    pub organization: String,
    #[serde(default)]
    pub workspaces: CloudWorkspaces,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForceUnlockMode {
    #[default]
    #[serde(alias = "none")]
    No,
    Yes,
    Auto,
}

/// Operator input for releasing a held state lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSpec {
    #[serde(default)]
    pub force_unlock: ForceUnlockMode,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lock_identifier: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckKind {
    Tcp,
    Http,
}

impl fmt::Display for HealthCheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("TCP"),
            Self::Http => f.write_str("HTTP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: HealthCheckKind,
    /// HTTP checks.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// TCP checks, `host:port`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<SignedDuration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutputsToSecret {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// `name` or `name:alias`; empty writes every output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(default, skip_serializing_if = "ApprovePlan::is_manual")]
    pub approve_plan: ApprovePlan,
    #[serde(default)]
    pub force: bool,
    /// Stop at plan: plans are computed and recorded but never applied.
    #[serde(default)]
    pub plan_only: bool,
    #[serde(default)]
    pub destroy: bool,
    #[serde(default)]
    pub suspend: bool,
    #[serde(default)]
    pub disable_drift_detection: bool,
    #[serde(default = "default_interval")]
    pub interval: SignedDuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<SignedDuration>,
    #[serde(default)]
    pub retry_strategy: RetryStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_interval: Option<SignedDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<Remediation>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub source_ref: SourceRef,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workspace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_config: Option<BackendConfigSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_config_secret_ref: Option<SecretRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_mappings: Vec<FileMapping>,
    #[serde(default)]
    pub upgrade_on_init: bool,
    #[serde(default)]
    pub refresh_before_apply: bool,
    #[serde(default)]
    pub parallelism: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
    #[serde(default)]
    pub enable_inventory: bool,
    #[serde(default)]
    pub destroy_resources_on_deletion: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<DependencyRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub health_checks: Vec<HealthCheck>,
    #[serde(default, rename = "tfstate", skip_serializing_if = "Option::is_none")]
    pub state: Option<StateSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_outputs_to_secret: Option<WriteOutputsToSecret>,
}

fn default_interval() -> SignedDuration {
    SignedDuration::from_mins(1)
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            approve_plan: ApprovePlan::default(),
            force: false,
            plan_only: false,
            destroy: false,
            suspend: false,
            disable_drift_detection: false,
            interval: default_interval(),
            retry_interval: None,
            retry_strategy: RetryStrategy::default(),
            max_retry_interval: None,
            remediation: None,
            path: String::new(),
            source_ref: SourceRef::default(),
            workspace: String::new(),
            backend_config: None,
            cloud: None,
            cli_config_secret_ref: None,
            env: Vec::new(),
            file_mappings: Vec::new(),
            upgrade_on_init: false,
            refresh_before_apply: false,
            parallelism: 0,
            targets: Vec::new(),
            enable_inventory: false,
            destroy_resources_on_deletion: false,
            depends_on: Vec::new(),
            health_checks: Vec::new(),
            state: None,
            write_outputs_to_secret: None,
        }
    }
}
