//! sandboxd - Application Entry Point
//!
//! Loads configuration, connects to the container runtime, builds the
//! sandbox pool and environment store, starts the background scheduler,
//! and serves the HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use bollard::Docker;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sandboxd::config::Config;
use sandboxd::container::{BollardRuntime, ContainerRuntime};
use sandboxd::handlers;
use sandboxd::middleware::logging_middleware;
use sandboxd::pool::SandboxPool;
use sandboxd::scheduler::BackgroundScheduler;
use sandboxd::state::AppState;
use sandboxd::store::EnvironmentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.rust_log.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting sandboxd");

    tracing::info!("connecting to container runtime...");
    let docker = Docker::connect_with_socket_defaults()?;
    let docker_info = docker.version().await?;
    let docker_version = docker_info.version.unwrap_or_default();
    tracing::info!(version = %docker_version, "connected to container runtime");

    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(BollardRuntime::new(docker.clone(), config.container.clone()));

    tracing::info!(count = config.container.docker_count, "initialising sandbox pool");
    let pool = Arc::new(SandboxPool::init(&config, runtime).await?);

    let store = EnvironmentStore::new(
        config.storage.environment_root.clone(),
        std::time::Duration::from_secs(config.execution.environment_expiration_seconds),
    )?;

    tracing::info!("starting background scheduler");
    let scheduler = BackgroundScheduler::new(&config, Arc::new(store.clone())).await?;
    scheduler.start(&config).await?;

    let state = AppState::new(docker, pool, store, config.clone(), docker_version);

    // A generous ceiling above the request's own execution budget, so a
    // wedged handler can't hold a connection open forever; large
    // /environments/ and /files/ downloads still get plenty of slack.
    let request_timeout = std::time::Duration::from_secs_f64(
        config.execution.execute_timeout_seconds
            + config.execution.wait_for_container_duration_seconds
            + 30.0,
    );

    let app = Router::new()
        .merge(handlers::routes())
        .layer(axum::middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state.clone());

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("sandboxd listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down, removing pooled containers");
    state.pool().shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
