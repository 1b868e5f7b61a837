//! JSON-over-HTTP transport.
//!
//! Each operation is a `POST {base}/v1/{operation}` with a JSON body. A 2xx
//! reply carries the operation's reply type; anything else carries an
//! [`EngineError`] body. Engine failures are translated here and nowhere else.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use strata_core::InventoryEntry;

use crate::engine::{BoxFuture, Engine, EngineResult};
use crate::error::{EngineError, ErrorKind};
use crate::protocol::*;

#[derive(Clone)]
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEngine {
    /// Client for the engine at `base_url`. `timeout` bounds each whole call.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| EngineError::other(format!("building engine client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Dropping the returned future aborts the request and closes its
    /// connection.
    fn call<Req, Reply>(&self, operation: &'static str, req: Req) -> BoxFuture<'_, EngineResult<Reply>>
    where
        Req: Serialize + Send + 'static,
        Reply: DeserializeOwned + Send + 'static,
    {
        let url = format!("{}/v1/{operation}", self.base_url);
        Box::pin(async move {
            tracing::debug!(operation, "engine call");
            let response = self
                .client
                .post(&url)
                .json(&req)
                .send()
                .await
                .map_err(|e| EngineError::unavailable(format!("{url}: {e}")))?;

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<Reply>()
                    .await
                    .map_err(|e| EngineError::other(format!("decoding reply from {url}: {e}")));
            }

            let status = status.as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| EngineError::unavailable(format!("{url}: {e}")))?;
            match serde_json::from_slice::<EngineError>(&body) {
                Ok(err) => Err(err),
                Err(_) => Err(EngineError::new(
                    kind_for_status(status),
                    format!("{url}: HTTP {status}"),
                )),
            }
        })
    }
}

fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        404 => ErrorKind::NotFound,
        502..=504 => ErrorKind::Unavailable,
        500..=599 => ErrorKind::Internal,
        _ => ErrorKind::Other,
    }
}

impl Engine for HttpEngine {
    fn upload_and_extract(
        &self,
        req: UploadAndExtractRequest,
    ) -> BoxFuture<'_, EngineResult<UploadAndExtractReply>> {
        self.call("upload-and-extract", req)
    }

    fn write_backend_config(
        &self,
        req: WriteBackendConfigRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("write-backend-config", req)
    }

    fn process_cli_config(
        &self,
        req: ProcessCliConfigRequest,
    ) -> BoxFuture<'_, EngineResult<ProcessCliConfigReply>> {
        self.call("process-cli-config", req)
    }

    fn look_path(&self, req: LookPathRequest) -> BoxFuture<'_, EngineResult<LookPathReply>> {
        self.call("look-path", req)
    }

    fn new_instance(
        &self,
        req: NewInstanceRequest,
    ) -> BoxFuture<'_, EngineResult<NewInstanceReply>> {
        self.call("new-instance", req)
    }

    fn set_env(&self, req: SetEnvRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("set-env", req)
    }

    fn create_file_mappings(
        &self,
        req: CreateFileMappingsRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("create-file-mappings", req)
    }

    fn generate_vars(&self, req: GenerateVarsRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("generate-vars", req)
    }

    fn generate_templates(
        &self,
        req: GenerateTemplatesRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("generate-templates", req)
    }

    fn init(&self, req: InitRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("init", req)
    }

    fn select_workspace(
        &self,
        req: SelectWorkspaceRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("select-workspace", req)
    }

    fn force_unlock(&self, req: ForceUnlockRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("force-unlock", req)
    }

    fn plan(&self, req: PlanRequest) -> BoxFuture<'_, EngineResult<PlanReply>> {
        self.call("plan", req)
    }

    fn save_plan(&self, req: SavePlanRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("save-plan", req)
    }

    fn load_plan(&self, req: LoadPlanRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("load-plan", req)
    }

    fn apply(&self, req: ApplyRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("apply", req)
    }

    fn destroy(&self, req: DestroyRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("destroy", req)
    }

    fn get_inventory(
        &self,
        req: InstanceRequest,
    ) -> BoxFuture<'_, EngineResult<Vec<InventoryEntry>>> {
        let reply = self.call::<_, InventoryReply>("get-inventory", req);
        Box::pin(async move { Ok(reply.await?.inventories) })
    }

    fn output(&self, req: InstanceRequest) -> BoxFuture<'_, EngineResult<OutputReply>> {
        self.call("output", req)
    }

    fn write_outputs(
        &self,
        req: WriteOutputsRequest,
    ) -> BoxFuture<'_, EngineResult<WriteOutputsReply>> {
        self.call("write-outputs", req)
    }

    fn get_outputs(&self, req: GetOutputsRequest) -> BoxFuture<'_, EngineResult<GetOutputsReply>> {
        self.call("get-outputs", req)
    }

    fn show_plan_diff(&self, req: ShowPlanRequest) -> BoxFuture<'_, EngineResult<ShowPlanReply>> {
        self.call("show-plan-diff", req)
    }

    fn finalize_secrets(
        &self,
        req: FinalizeSecretsRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("finalize-secrets", req)
    }

    fn cleanup_dir(&self, req: CleanupDirRequest) -> BoxFuture<'_, EngineResult<MessageReply>> {
        self.call("cleanup-dir", req)
    }
}
