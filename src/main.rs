use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use ops_core::config::{Config, StorageBackend};
use ops_core::lifecycle::LifecycleManager;
use ops_core::routing_client::RoutingClient;
use ops_core::store::memory::InMemoryStateStore;
use ops_core::store::redis::RedisStateStore;
use ops_core::store::StateStore;
use ops_core::workflow::WorkflowEngine;
use ops_core::{api::ApiServer, seed};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "configuration error at startup");
            return ExitCode::from(1);
        }
    };

    let store: Arc<dyn StateStore> = match config.storage_backend {
        StorageBackend::Memory => Arc::new(InMemoryStateStore::new()),
        StorageBackend::Redis => {
            let redis_config = config
                .redis
                .as_ref()
                .expect("Config::load guarantees redis config when backend=redis");
            match RedisStateStore::connect(redis_config).await {
                Ok(store) => Arc::new(store),
                Err(err) => {
                    tracing::error!(error = %err, "failed to reach Redis backend at startup");
                    return ExitCode::from(2);
                }
            }
        }
    };

    let lifecycle = Arc::new(LifecycleManager::new(store.clone()));

    let routing_client = match RoutingClient::new(config.routing.base_url.clone(), config.routing.timeout_seconds) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            tracing::error!(error = %err, "failed to build routing client");
            return ExitCode::from(1);
        }
    };

    let workflow = Arc::new(WorkflowEngine::new(store.clone(), lifecycle.clone(), routing_client));

    if let Some(dir) = &config.seed_workflows_dir {
        seed::load_seed_workflows(&PathBuf::from(dir), &workflow).await;
    }

    let http_config = Arc::new(config.http.clone());
    let api_server = ApiServer::new(http_config, lifecycle, workflow.clone());

    let shutdown = CancellationToken::new();
    let dispatch_shutdown = shutdown.clone();
    let dispatch_workflow = workflow.clone();
    let dispatch_loop = tokio::spawn(async move {
        dispatch_workflow.run_dispatch_loop(dispatch_shutdown).await;
    });

    // `api_server.run()` itself awaits the shutdown signal internally via
    // `with_graceful_shutdown`, so it only returns once a SIGINT/SIGTERM
    // has already been observed.
    if let Err(err) = api_server.run().await {
        tracing::error!(error = %err, "API server failed");
    }

    shutdown.cancel();
    if let Err(err) = dispatch_loop.await {
        tracing::error!(error = %err, "dispatch loop task panicked");
    }

    ExitCode::SUCCESS
}
