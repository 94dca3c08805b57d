use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::version::{SERVICE_NAME, VERSION};

use crate::http_server::api::client::ApiRequest;

#[derive(Debug, Clone, Default)]
pub struct InfoRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
}

pub async fn handler() -> Response {
    Json(InfoResponse {
        name: SERVICE_NAME.to_string(),
        version: VERSION.to_string(),
    })
    .into_response()
}

impl ApiRequest for InfoRequest {
    type Response = InfoResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        Ok(client.get(base_url.join("/info")?))
    }
}
