use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse};
use tower_http::LatencyUnit;

pub mod api;
mod config;
mod handlers;
pub(crate) mod health;

pub use config::Config;

use crate::service_state::{ComputeState, UserState};
use health::DataSource;

const STATUS_PREFIX: &str = "/_status";

/// Full user node router: `/recrypt_header`, `/info` and `/_status`.
pub fn user_router(state: UserState, config: &Config) -> Router {
    with_status(api::user_router(state.clone()), state, config)
}

/// Full compute node router: `/get_compute_key_info`, `/info` and `/_status`.
pub fn compute_router(state: ComputeState, config: &Config) -> Router {
    with_status(api::compute_router(state.clone()), state, config)
}

fn with_status<S>(api: Router<S>, state: S, config: &Config) -> Router
where
    S: DataSource + Clone + Send + Sync + 'static,
{
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(config.log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    api.nest(STATUS_PREFIX, health::router())
        .fallback(handlers::not_found_handler)
        .with_state(state)
        .layer(trace_layer)
}

/// Run the user node HTTP server until `shutdown_rx` fires.
pub async fn run_user(
    config: Config,
    state: UserState,
    shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let router = user_router(state, &config);
    tracing::info!(addr = ?config.listen_addr, "user node listening");
    serve(config, router, shutdown_rx).await
}

/// Run the compute node HTTP server until `shutdown_rx` fires.
pub async fn run_compute(
    config: Config,
    state: ComputeState,
    shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let router = compute_router(state, &config);
    tracing::info!(addr = ?config.listen_addr, "compute node listening");
    serve(config, router, shutdown_rx).await
}

async fn serve(
    config: Config,
    router: Router,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let listener = TcpListener::bind(config.listen_addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
