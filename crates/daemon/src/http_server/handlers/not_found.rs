use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::http_server::api::detail;

pub async fn not_found_handler(headers: HeaderMap) -> Response {
    let accept = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok());

    match accept {
        Some(accept_str) if accept_str.contains("text/plain") => (
            StatusCode::NOT_FOUND,
            [(axum::http::header::CONTENT_TYPE, "text/plain")],
            "not found",
        )
            .into_response(),
        _ => detail(StatusCode::NOT_FOUND, "Not Found"),
    }
}
