use std::collections::BTreeMap;

use serde_json::Value;
use strata_core::{ManagedResource, reason};
use strata_engine::EngineError;
use strata_engine::protocol::{
    GetOutputsRequest, InstanceRequest, OutputMeta, WriteOutputsRequest,
};

use crate::cluster::Severity;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::setup::{Workspace, not_ready};

/// Secret payload for the selected outputs.
///
/// An empty selection exports everything. Entries are `name` or
/// `name:alias`; unknown names are skipped. Strings are written raw,
/// numbers and booleans as their JSON text, anything else as JSON.
pub fn select_outputs(
    outputs: &BTreeMap<String, OutputMeta>,
    selection: &[String],
) -> Result<BTreeMap<String, Vec<u8>>, ControllerError> {
    let mut data = BTreeMap::new();
    if selection.is_empty() {
        for (name, meta) in outputs {
            data.insert(name.clone(), encode_output(meta)?);
        }
        return Ok(data);
    }

    for entry in selection.iter().map(String::as_str) {
        let (name, alias) = entry.split_once(':').unwrap_or((entry, entry));
        let Some(meta) = outputs.get(name) else {
            tracing::warn!(output = name, "output not found");
            continue;
        };
        data.insert(alias.to_string(), encode_output(meta)?);
    }
    Ok(data)
}

fn encode_output(meta: &OutputMeta) -> Result<Vec<u8>, ControllerError> {
    let bytes = match (&meta.kind, &meta.value) {
        (Value::String(kind), Value::String(s)) if kind == "string" => s.clone().into_bytes(),
        (Value::String(kind), value) if kind == "number" || kind == "bool" => {
            value.to_string().into_bytes()
        }
        (_, value) => serde_json::to_vec(value)
            .map_err(|e| ControllerError::Phase(format!("cannot encode output: {e}")))?,
    };
    Ok(bytes)
}

impl Reconciler {
    /// Record the available output names and, when requested, write the
    /// selected outputs to the output secret.
    pub(crate) async fn process_outputs(
        &self,
        resource: &mut ManagedResource,
        workspace: &Workspace,
        revision: &str,
    ) -> Result<(), ControllerError> {
        let key = resource.key();
        let reply = self
            .engine
            .output(InstanceRequest {
                instance: workspace.instance.clone(),
            })
            .await
            .map_err(|e| {
                not_ready(
                    resource,
                    revision,
                    reason::OUTPUT_FAILED,
                    format!("error running Output: {e}"),
                )
            })?;

        if !reply.outputs.is_empty() {
            let names = reply.outputs.keys().cloned().collect();
            resource.mark_outputs_available(names, "Outputs available");
        }

        let Some(target) = resource.spec.write_outputs_to_secret.clone() else {
            return Ok(());
        };
        if reply.outputs.is_empty() {
            return Ok(());
        }

        let data = select_outputs(&reply.outputs, &target.outputs)?;
        if data.is_empty() || resource.spec.destroy {
            resource.mark_outputs_written(revision, "No Outputs written");
            self.patch_status(resource).await?;
            return Ok(());
        }

        let written_keys: Vec<String> = data.keys().cloned().collect();
        let written = self
            .engine
            .write_outputs(WriteOutputsRequest {
                namespace: resource.namespace().to_string(),
                name: resource.name().to_string(),
                secret_name: target.name.clone(),
                uid: resource.metadata.uid.clone(),
                data,
                labels: target.labels,
                annotations: target.annotations,
            })
            .await
            .map_err(|e| not_ready(resource, revision, reason::OUTPUTS_WRITING_FAILED, e.to_string()))?;

        tracing::info!(
            resource = %key,
            secret = %target.name,
            changed = written.changed,
            "outputs written"
        );
        if written.changed {
            let msg = format!(
                "Outputs written.\n{} output(s): {}",
                written_keys.len(),
                written_keys.join(", ")
            );
            self.event(resource, Severity::Info, reason::OUTPUTS_WRITTEN, msg, revision)
                .await;
        }
        resource.mark_outputs_written(revision, "Outputs written");
        self.patch_status(resource).await?;
        Ok(())
    }

    /// The output secret is declared but absent, so outputs must be
    /// extracted again.
    pub(crate) async fn outputs_may_be_drifted(
        &self,
        resource: &ManagedResource,
    ) -> Result<bool, ControllerError> {
        let Some(target) = &resource.spec.write_outputs_to_secret else {
            return Ok(false);
        };
        let exists = self
            .output_secret_exists(resource.namespace(), &target.name)
            .await?;
        Ok(!exists)
    }

    /// Ask the engine, which owns output secrets, whether one exists.
    pub(crate) async fn output_secret_exists(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<bool, EngineError> {
        let req = GetOutputsRequest {
            namespace: namespace.to_string(),
            secret_name: name.to_string(),
        };
        match self.engine.get_outputs(req).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
