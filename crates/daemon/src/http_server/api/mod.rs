use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::header::{ACCEPT, CONTENT_TYPE, ORIGIN};
use http::Method;
use tower_http::cors::{Any, CorsLayer};

pub mod client;
pub mod get_compute_key_info;
pub mod info;
pub mod recrypt_header;

use crate::service_state::{ComputeState, UserState};

const CORS_MAX_AGE: Duration = Duration::from_secs(3600);

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods(vec![Method::GET, Method::POST])
        .allow_headers(vec![ACCEPT, CONTENT_TYPE, ORIGIN])
        .allow_origin(Any)
        .allow_credentials(false)
        .max_age(CORS_MAX_AGE)
}

/// Error body shared by every endpoint: `{"detail": ...}`
pub(crate) fn detail(status: StatusCode, detail: impl Into<String>) -> Response {
    let body = serde_json::json!({"detail": detail.into()});
    (status, Json(body)).into_response()
}

pub fn user_router(state: UserState) -> Router<UserState> {
    Router::new()
        .route("/recrypt_header", post(recrypt_header::handler))
        .route("/info", get(info::handler))
        .with_state(state)
        .layer(cors())
}

pub fn compute_router(state: ComputeState) -> Router<ComputeState> {
    Router::new()
        .route("/get_compute_key_info", post(get_compute_key_info::handler))
        .route("/info", get(info::handler))
        .with_state(state)
        .layer(cors())
}
