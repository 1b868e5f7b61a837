//! Shared fixtures: a scripted engine, an artifact directory and a
//! reconciler wired to the in-memory cluster.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use strata_controller::{
    Action, ClusterClient, Config, DirectorySource, InMemoryCluster, Reconciler,
};
use strata_core::encoding::{ENCODING_ANNOTATION, GZIP, decode_plan, encode_plan};
use strata_core::plan_id::plan_id;
use strata_core::resource::SourceRef;
use strata_core::{ApprovePlan, InventoryEntry, ManagedResource, ObjectKey};
use strata_engine::protocol::*;
use strata_engine::{BoxFuture, Engine, EngineError, EngineResult, InstanceHandle};
use tempfile::TempDir;

pub const NAMESPACE: &str = "flux-system";
pub const REV: &str = "main/b8e362c206e3d0cbb7ed22ced771a0056455a2fb";
pub const REV2: &str = "main/ed22ced771a0056455a2fbb8e362c206e3d0cbb7";
pub const TMP_DIR: &str = "/tmp/strata-test";

/// What the engine answers. Tests flip fields between passes.
#[derive(Default)]
pub struct Script {
    /// The real plan has changes.
    pub changes: bool,
    /// A destroy plan finds objects to remove.
    pub destroy_has_objects: bool,
    /// The refresh-only drift plan reports drift.
    pub drift: bool,
    pub diff: String,
    /// Plans fail with this lock until it is force-unlocked.
    pub plan_lock: Option<String>,
    pub apply_error: Option<EngineError>,
    pub upload_error: Option<String>,
    pub outputs: BTreeMap<String, OutputMeta>,
    pub inventory: Vec<InventoryEntry>,
    pub finalize_errors: VecDeque<EngineError>,
    /// Output secret lookups fail with this instead of answering.
    pub get_outputs_error: Option<EngineError>,
}

struct SavedPlan {
    id: String,
    annotations: BTreeMap<String, String>,
    payload: Vec<u8>,
}

/// Stands in for the engine service. Output secrets live here, out of
/// the cluster store's reach, the way the real engine writes them.
pub struct FakeEngine {
    script: Mutex<Script>,
    calls: Mutex<Vec<String>>,
    plans: Mutex<BTreeMap<ObjectKey, SavedPlan>>,
    secrets: Mutex<BTreeMap<ObjectKey, BTreeMap<String, Vec<u8>>>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                changes: true,
                destroy_has_objects: true,
                ..Script::default()
            }),
            calls: Mutex::new(Vec::new()),
            plans: Mutex::new(BTreeMap::new()),
            secrets: Mutex::new(BTreeMap::new()),
        }
    }

    /// Output secret the engine wrote for `key`.
    pub fn secret(&self, key: &ObjectKey) -> Option<BTreeMap<String, Vec<u8>>> {
        self.secrets.lock().expect("secrets lock").get(key).cloned()
    }

    pub fn remove_secret(&self, key: &ObjectKey) -> bool {
        self.secrets.lock().expect("secrets lock").remove(key).is_some()
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("script lock")
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("calls lock").clear();
    }

    /// Annotations the last saved plan of `key` was stored with.
    pub fn saved_plan_annotations(&self, key: &ObjectKey) -> Option<BTreeMap<String, String>> {
        self.plans
            .lock()
            .expect("plans lock")
            .get(key)
            .map(|p| p.annotations.clone())
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().expect("calls lock").push(call.into());
    }
}

fn message(text: &str) -> MessageReply {
    MessageReply {
        message: text.to_string(),
    }
}

fn ready<T: Send + 'static>(value: EngineResult<T>) -> BoxFuture<'static, EngineResult<T>> {
    Box::pin(async move { value })
}

impl Engine for FakeEngine {
    fn upload_and_extract(
        &self,
        req: UploadAndExtractRequest,
    ) -> BoxFuture<'_, EngineResult<UploadAndExtractReply>> {
        self.record("upload_and_extract");
        if let Some(err) = self.script().upload_error.clone() {
            return ready(Err(EngineError::other(err)));
        }
        ready(Ok(UploadAndExtractReply {
            working_dir: format!("{TMP_DIR}/{}-{}/{}", req.namespace, req.name, req.path),
            tmp_dir: TMP_DIR.to_string(),
        }))
    }

    fn write_backend_config(
        &self,
        _req: WriteBackendConfigRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.record("write_backend_config");
        ready(Ok(message("backend config written")))
    }

    fn process_cli_config(
        &self,
        req: ProcessCliConfigRequest,
    ) -> BoxFuture<'_, EngineResult<ProcessCliConfigReply>> {
        self.record("process_cli_config");
        ready(Ok(ProcessCliConfigReply {
            file_path: format!("{}/generated.tfrc", req.dir_path),
        }))
    }

    fn look_path(&self, _req: LookPathRequest) -> BoxFuture<'_, EngineResult<LookPathReply>> {
        ready(Ok(LookPathReply {
            exec_path: "/usr/local/bin/terraform".to_string(),
        }))
    }

    fn new_instance(
        &self,
        req: NewInstanceRequest,
    ) -> BoxFuture<'_, EngineResult<NewInstanceReply>> {
        ready(Ok(NewInstanceReply {
            instance: InstanceHandle(req.instance_id),
        }))
    }

    fn set_env(&self, _req: SetEnvRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        ready(Ok(message("ok")))
    }

    fn create_file_mappings(
        &self,
        _req: CreateFileMappingsRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.record("create_file_mappings");
        ready(Ok(message("ok")))
    }

    fn generate_vars(&self, _req: GenerateVarsRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        ready(Ok(message("ok")))
    }

    fn generate_templates(
        &self,
        _req: GenerateTemplatesRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>> {
        ready(Ok(message("ok")))
    }

    fn init(&self, _req: InitRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.record("init");
        ready(Ok(message("initialized")))
    }

    fn select_workspace(
        &self,
        _req: SelectWorkspaceRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>> {
        ready(Ok(message("ok")))
    }

    fn force_unlock(&self, req: ForceUnlockRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.record(format!("force_unlock:{}", req.lock_identifier));
        let mut script = self.script();
        if script.plan_lock.as_deref() == Some(req.lock_identifier.as_str()) {
            script.plan_lock = None;
        }
        ready(Ok(message("unlocked")))
    }

    fn plan(&self, req: PlanRequest) -> BoxFuture<'_, EngineResult<PlanReply>> {
        let call = if req.destroy {
            format!("plan:{}:destroy", req.out)
        } else {
            format!("plan:{}", req.out)
        };
        self.record(call);

        let script = self.script();
        if let Some(lock_id) = &script.plan_lock {
            return ready(Err(EngineError::state_locked(
                lock_id.clone(),
                format!("Error acquiring the state lock: ID: {lock_id}"),
            )));
        }
        let (drifted, plan_created) = if req.out == "tfdrift" {
            (script.drift, script.drift)
        } else if req.destroy {
            (script.destroy_has_objects, script.destroy_has_objects)
        } else {
            (script.changes, true)
        };
        ready(Ok(PlanReply {
            drifted,
            plan_created,
            message: "plan done".to_string(),
        }))
    }

    fn save_plan(&self, req: SavePlanRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.record("save_plan");
        let mut annotations = BTreeMap::new();
        annotations.insert(ENCODING_ANNOTATION.to_string(), GZIP.to_string());
        let id = plan_id(&req.revision);
        let payload = match encode_plan(id.as_bytes(), &annotations) {
            Ok(payload) => payload,
            Err(e) => return ready(Err(EngineError::other(e.to_string()))),
        };
        self.plans.lock().expect("plans lock").insert(
            ObjectKey::new(&req.namespace, &req.name),
            SavedPlan {
                id,
                annotations,
                payload,
            },
        );
        ready(Ok(message("plan saved")))
    }

    fn load_plan(&self, req: LoadPlanRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.record("load_plan");
        let key = ObjectKey::new(&req.namespace, &req.name);
        let plans = self.plans.lock().expect("plans lock");
        let Some(saved) = plans.get(&key) else {
            return ready(Err(EngineError::not_found(format!("plan secret for {key} not found"))));
        };
        if saved.id != req.pending_plan {
            return ready(Err(EngineError::other(format!(
                "error pending plan and plan's name in the secret are not matched: {} != {}",
                req.pending_plan, saved.id
            ))));
        }
        match decode_plan(&saved.payload, &saved.annotations) {
            Ok(plan) if plan == saved.id.as_bytes() => ready(Ok(message("plan loaded"))),
            Ok(_) => ready(Err(EngineError::other("corrupted plan"))),
            Err(e) => ready(Err(EngineError::other(e.to_string()))),
        }
    }

    fn apply(&self, _req: ApplyRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.record("apply");
        match self.script().apply_error.clone() {
            Some(err) => ready(Err(err)),
            None => ready(Ok(message("applied"))),
        }
    }

    fn destroy(&self, _req: DestroyRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.record("destroy");
        ready(Ok(message("destroyed")))
    }

    fn get_inventory(&self, _req: InstanceRequest) -> BoxFuture<'_, EngineResult<Vec<InventoryEntry>>> {
        self.record("get_inventory");
        ready(Ok(self.script().inventory.clone()))
    }

    fn output(&self, _req: InstanceRequest) -> BoxFuture<'_, EngineResult<OutputReply>> {
        ready(Ok(OutputReply {
            outputs: self.script().outputs.clone(),
        }))
    }

    fn write_outputs(
        &self,
        req: WriteOutputsRequest,
    ) -> BoxFuture<'_, EngineResult<WriteOutputsReply>> {
        self.record("write_outputs");
        let key = ObjectKey::new(&req.namespace, &req.secret_name);
        let mut secrets = self.secrets.lock().expect("secrets lock");
        let changed = secrets.get(&key) != Some(&req.data);
        secrets.insert(key, req.data);
        ready(Ok(WriteOutputsReply { changed }))
    }

    fn get_outputs(&self, req: GetOutputsRequest) -> BoxFuture<'_, EngineResult<GetOutputsReply>> {
        self.record("get_outputs");
        if let Some(err) = self.script().get_outputs_error.clone() {
            return ready(Err(err));
        }
        let key = ObjectKey::new(&req.namespace, &req.secret_name);
        let Some(data) = self.secret(&key) else {
            return ready(Err(EngineError::not_found(format!("secret {key} not found"))));
        };
        let outputs = data
            .into_iter()
            .map(|(k, v)| (k, String::from_utf8_lossy(&v).into_owned()))
            .collect();
        ready(Ok(GetOutputsReply { outputs }))
    }

    fn show_plan_diff(&self, req: ShowPlanRequest) -> BoxFuture<'_, EngineResult<ShowPlanReply>> {
        self.record(format!("show_plan_diff:{}", req.plan_file));
        ready(Ok(ShowPlanReply {
            diff: self.script().diff.clone(),
        }))
    }

    fn finalize_secrets(
        &self,
        req: FinalizeSecretsRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.record("finalize_secrets");
        let failure = self.script().finalize_errors.pop_front();
        if let Some(err) = failure {
            return ready(Err(err));
        }
        if req.has_outputs_secret {
            let key = ObjectKey::new(&req.namespace, &req.outputs_secret_name);
            self.remove_secret(&key);
        }
        ready(Ok(message("finalized")))
    }

    fn cleanup_dir(&self, _req: CleanupDirRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.record("cleanup_dir");
        ready(Ok(message("cleaned")))
    }
}

pub struct Harness {
    pub reconciler: Reconciler,
    pub cluster: Arc<InMemoryCluster>,
    pub engine: Arc<FakeEngine>,
    pub artifacts: TempDir,
}

pub fn harness() -> Harness {
    harness_with(Config::default())
}

pub fn harness_with(config: Config) -> Harness {
    let cluster = Arc::new(InMemoryCluster::new());
    let engine = Arc::new(FakeEngine::new());
    let artifacts = tempfile::tempdir().expect("tempdir");
    let source = Arc::new(DirectorySource::new(artifacts.path()));
    let reconciler = Reconciler::new(engine.clone(), cluster.clone(), source, config);
    Harness {
        reconciler,
        cluster,
        engine,
        artifacts,
    }
}

impl Harness {
    /// Publish `revision` of the source named `source` in `namespace`.
    pub fn publish(&self, namespace: &str, source: &str, revision: &str) {
        let dir = self.artifacts.path().join(namespace).join(source);
        std::fs::create_dir_all(&dir).expect("create source dir");
        std::fs::write(dir.join("artifact.tar.gz"), b"tarball").expect("write tarball");
        std::fs::write(dir.join("revision"), revision).expect("write revision");
    }

    /// Create the source directory without an artifact in it.
    pub fn publish_empty(&self, namespace: &str, source: &str) {
        std::fs::create_dir_all(self.artifacts.path().join(namespace).join(source))
            .expect("create source dir");
    }

    pub fn source_dir(&self) -> &Path {
        self.artifacts.path()
    }

    pub async fn create(&self, resource: ManagedResource) -> ObjectKey {
        self.cluster.apply(resource).await
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> Action {
        self.reconciler.reconcile(key).await.expect("reconcile")
    }

    /// First pass adds the finalizer; the second does the work.
    pub async fn reconcile_fresh(&self, key: &ObjectKey) -> Action {
        let first = self.reconcile(key).await;
        assert!(first.requeue_now, "first pass should only add the finalizer");
        self.reconcile(key).await
    }

    pub async fn get(&self, key: &ObjectKey) -> ManagedResource {
        self.cluster.resource(key).await.expect("resource exists")
    }

    /// Pretend the reconcile interval has elapsed since the last plan.
    pub async fn expire_interval(&self, key: &ObjectKey) {
        let mut resource = self.get(key).await;
        let earlier = Timestamp::now()
            .checked_sub(SignedDuration::from_hours(2))
            .expect("timestamp");
        resource.status.last_plan_at = Some(earlier);
        self.cluster
            .patch_status(key, &resource.status)
            .await
            .expect("patch status");
    }

    pub async fn event_reasons(&self, key: &ObjectKey) -> Vec<String> {
        self.cluster
            .events_for(key)
            .await
            .into_iter()
            .map(|e| e.reason)
            .collect()
    }
}

pub fn resource(name: &str) -> ManagedResource {
    let mut r = ManagedResource::default();
    r.metadata.name = name.to_string();
    r.metadata.namespace = NAMESPACE.to_string();
    r.spec.path = "./".to_string();
    r.spec.interval = SignedDuration::from_mins(1);
    r.spec.source_ref = SourceRef {
        kind: "GitRepository".to_string(),
        name: name.to_string(),
        namespace: None,
    };
    r
}

pub fn auto(name: &str) -> ManagedResource {
    let mut r = resource(name);
    r.spec.approve_plan = ApprovePlan::Auto;
    r
}

pub fn string_output(value: &str) -> OutputMeta {
    OutputMeta {
        sensitive: false,
        kind: serde_json::json!("string"),
        value: serde_json::json!(value),
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
