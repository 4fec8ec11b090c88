mod cli;
mod config;
mod demo_executor;
mod status;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use streamwork_common::{ExecutorFactory, MockStateFetcher, MockWorkService, StateFetcher, WorkService};
use streamwork_engine::{Engine, EngineConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::Cli;
use crate::config::WorkerConfig;

/// Resolves a `service_stub` tag to a concrete [`WorkService`] via a small
/// constructor table chosen at startup.
fn build_work_service(tag: &str) -> anyhow::Result<Arc<dyn WorkService>> {
    match tag {
        "mock" => Ok(Arc::new(MockWorkService::new())),
        other => anyhow::bail!("unknown service-stub `{other}`; only `mock` is built in"),
    }
}

/// Resolves the executor factory for pre-registered descriptors. Real
/// executor construction (the user-pipeline execution engine) is out of
/// scope; this always hands back the demo echo executor.
fn build_executor_factory(_cfg: &WorkerConfig) -> Arc<dyn ExecutorFactory> {
    Arc::new(demo_executor::DemoExecutorFactory)
}

/// Resolves the state-fetcher collaborator handed to every executor context.
/// Real persisted state lives behind the work service; like the executor
/// factory, this always hands back an in-memory stand-in.
fn build_state_fetcher(_cfg: &WorkerConfig) -> Arc<dyn StateFetcher> {
    Arc::new(MockStateFetcher::new())
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let (worker_config, startup_descriptors) = match config::load(cli) {
        Ok(loaded) => loaded,
        Err(err) => {
            // Malformed startup config/descriptors are fatal.
            tracing::error!(error = %err, "fatal: invalid startup configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        hostport = %worker_config.service_hostport,
        status_port = worker_config.status_port,
        service_stub = %worker_config.service_stub,
        computations = startup_descriptors.len(),
        "starting worker"
    );

    let service = build_work_service(&worker_config.service_stub)?;
    let factory = build_executor_factory(&worker_config);
    let state_fetcher = build_state_fetcher(&worker_config);
    let engine_config: EngineConfig = worker_config.engine_config();

    let engine = Engine::start(engine_config, factory, service, state_fetcher, startup_descriptors);
    tracing::info!(client_id = %engine.client_id(), "engine started");

    let status_state = status::StatusState { engine: engine.handle() };
    let app = status::router(status_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], worker_config.status_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "status server listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "status server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("stopping engine");
    tokio::task::spawn_blocking(move || engine.stop()).await?;
    tracing::info!("engine stopped");

    Ok(())
}
