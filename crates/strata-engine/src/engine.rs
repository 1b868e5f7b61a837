use std::future::Future;
use std::pin::Pin;

use strata_core::InventoryEntry;

use crate::error::EngineError;
use crate::protocol::*;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type EngineResult<T> = Result<T, EngineError>;

/// Remote execution engine.
///
/// Every call waits until the engine replies. Dropping the returned future
/// aborts the call.
pub trait Engine: Send + Sync {
    fn upload_and_extract(
        &self,
        req: UploadAndExtractRequest,
    ) -> BoxFuture<'_, EngineResult<UploadAndExtractReply>>;

    fn write_backend_config(
        &self,
        req: WriteBackendConfigRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>>;

    fn process_cli_config(
        &self,
        req: ProcessCliConfigRequest,
    ) -> BoxFuture<'_, EngineResult<ProcessCliConfigReply>>;

    fn look_path(&self, req: LookPathRequest) -> BoxFuture<'_, EngineResult<LookPathReply>>;

    fn new_instance(&self, req: NewInstanceRequest)
    -> BoxFuture<'_, EngineResult<NewInstanceReply>>;

    fn set_env(&self, req: SetEnvRequest) -> BoxFuture<'_, EngineResult<MessageReply>>;

    fn create_file_mappings(
        &self,
        req: CreateFileMappingsRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>>;

    fn generate_vars(&self, req: GenerateVarsRequest) -> BoxFuture<'_, EngineResult<MessageReply>>;

    fn generate_templates(
        &self,
        req: GenerateTemplatesRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>>;

    /// A held state lock fails with `lock_identifier` set.
    fn init(&self, req: InitRequest) -> BoxFuture<'_, EngineResult<MessageReply>>;

    fn select_workspace(
        &self,
        req: SelectWorkspaceRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>>;

    fn force_unlock(&self, req: ForceUnlockRequest) -> BoxFuture<'_, EngineResult<MessageReply>>;

    /// A held state lock fails with `lock_identifier` set.
    fn plan(&self, req: PlanRequest) -> BoxFuture<'_, EngineResult<PlanReply>>;

    fn save_plan(&self, req: SavePlanRequest) -> BoxFuture<'_, EngineResult<MessageReply>>;

    fn load_plan(&self, req: LoadPlanRequest) -> BoxFuture<'_, EngineResult<MessageReply>>;

    /// A held state lock fails with `lock_identifier` set.
    fn apply(&self, req: ApplyRequest) -> BoxFuture<'_, EngineResult<MessageReply>>;

    fn destroy(&self, req: DestroyRequest) -> BoxFuture<'_, EngineResult<MessageReply>>;

    fn get_inventory(&self, req: InstanceRequest) -> BoxFuture<'_, EngineResult<Vec<InventoryEntry>>>;

    fn output(&self, req: InstanceRequest) -> BoxFuture<'_, EngineResult<OutputReply>>;

    fn write_outputs(
        &self,
        req: WriteOutputsRequest,
    ) -> BoxFuture<'_, EngineResult<WriteOutputsReply>>;

    fn get_outputs(&self, req: GetOutputsRequest) -> BoxFuture<'_, EngineResult<GetOutputsReply>>;

    fn show_plan_diff(&self, req: ShowPlanRequest) -> BoxFuture<'_, EngineResult<ShowPlanReply>>;

    fn finalize_secrets(
        &self,
        req: FinalizeSecretsRequest,
    ) -> BoxFuture<'_, EngineResult<MessageReply>>;

    fn cleanup_dir(&self, req: CleanupDirRequest) -> BoxFuture<'_, EngineResult<MessageReply>>;
}
