use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use eyre::WrapErr;
use strata_core::ManagedResource;
use strata_controller::runtime::forward_changes;
use strata_controller::{
    ClusterClient, Config, DirectorySource, InMemoryCluster, Reconciler, WorkerRuntime, telemetry,
};
use strata_engine::HttpEngine;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let config = Config::from_env()?;
    telemetry::init(config.log_format);

    let resources_file = PathBuf::from(
        env::var("STRATA_RESOURCES_FILE").unwrap_or_else(|_| "resources.json".to_string()),
    );
    let artifact_root = PathBuf::from(
        env::var("STRATA_ARTIFACT_ROOT").unwrap_or_else(|_| "artifacts".to_string()),
    );

    let raw = tokio::fs::read(&resources_file)
        .await
        .wrap_err_with(|| format!("reading {}", resources_file.display()))?;
    let resources: Vec<ManagedResource> = serde_json::from_slice(&raw)
        .wrap_err_with(|| format!("parsing {}", resources_file.display()))?;

    let cluster = Arc::new(InMemoryCluster::new());
    let changes = cluster.subscribe();
    for resource in resources {
        let key = cluster.apply(resource).await;
        tracing::info!(resource = %key, "loaded resource");
    }

    tracing::info!(
        engine = %config.engine_url,
        artifacts = %artifact_root.display(),
        "starting controller"
    );
    let engine = HttpEngine::new(config.engine_url.clone(), config.engine_timeout)
        .wrap_err("creating engine client")?;
    let engine = Arc::new(engine);
    let source = Arc::new(DirectorySource::new(artifact_root));
    let reconciler = Reconciler::new(engine, cluster.clone(), source, config);

    let runtime = WorkerRuntime::start(reconciler);
    let queue = runtime.handle();
    let forwarder = forward_changes(changes, queue.clone());
    for key in cluster.list().await? {
        queue.enqueue(key);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    forwarder.abort();
    runtime.shutdown().await;
    Ok(())
}
