use axum::routing::get;
use axum::Router;

mod data_source;
mod liveness;
mod readiness;
mod version;

pub use data_source::{DataSource, DataSourceError};

/// `/livez`, `/readyz` and `/version`, for any state that can report readiness
pub fn router<S>() -> Router<S>
where
    S: DataSource + Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/livez", get(liveness::handler))
        .route("/readyz", get(readiness::handler))
        .route("/version", get(version::handler))
}
