use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::keypair::to_minute_iso;

use super::detail;
use crate::http_server::api::client::ApiRequest;
use crate::recrypt::RecryptError;
use crate::service_state::UserState;

/// Detail returned when the user's key cannot open the submitted header
pub const UNDECRYPTABLE_DETAIL: &str = "The key header was not able to decode the header. \
     Please make sure that the encrypted header is decryptable by the user's private key";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecryptHeaderRequest {
    /// Base64 encoded Crypt4GH header, encrypted for the user's key
    pub crypt4gh_header: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecryptHeaderResponse {
    /// Base64 encoded header, encrypted for the compute node's key
    pub crypt4gh_header: String,
    pub crypt4gh_compute_keypair_id: String,
    /// UTC, minute precision (`%Y-%m-%dT%H:%M`)
    pub crypt4gh_compute_keypair_expiration_date: String,
}

pub async fn handler(
    State(state): State<UserState>,
    payload: Result<Json<RecryptHeaderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, RecryptError> {
    let Json(req) = payload.map_err(|e| RecryptError::Input(e.body_text()))?;
    let outcome = state
        .recryptor()
        .recrypt_header(&req.crypt4gh_header)
        .await?;

    Ok((
        StatusCode::OK,
        Json(RecryptHeaderResponse {
            crypt4gh_header: outcome.encoded_header(),
            crypt4gh_compute_keypair_id: outcome.keypair_id.to_string(),
            crypt4gh_compute_keypair_expiration_date: to_minute_iso(&outcome.expiration),
        }),
    ))
}

impl IntoResponse for RecryptError {
    fn into_response(self) -> Response {
        match &self {
            RecryptError::Input(_) | RecryptError::Decryption => {
                tracing::info!(error = %self, "recrypt request rejected")
            }
            _ => tracing::error!(error = ?self, "recrypt request failed"),
        }

        match self {
            RecryptError::Input(reason) => detail(StatusCode::BAD_REQUEST, reason),
            RecryptError::Decryption => detail(StatusCode::NOT_ACCEPTABLE, UNDECRYPTABLE_DETAIL),
            RecryptError::Engine(_) => {
                detail(StatusCode::INTERNAL_SERVER_ERROR, "Header recryption failed")
            }
            RecryptError::EngineTimeout(_) => {
                detail(StatusCode::GATEWAY_TIMEOUT, "Header recryption timed out")
            }
            RecryptError::Network(_) => detail(
                StatusCode::BAD_GATEWAY,
                "Could not retrieve compute keypair info",
            ),
            RecryptError::NetworkTimeout => detail(
                StatusCode::GATEWAY_TIMEOUT,
                "Compute keypair info request timed out",
            ),
            RecryptError::Mismatch(_) => detail(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Compute keypair changed during recryption",
            ),
            RecryptError::Storage(_) | RecryptError::ComputeKey(_) => {
                detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl ApiRequest for RecryptHeaderRequest {
    type Response = RecryptHeaderResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        Ok(client.post(base_url.join("/recrypt_header")?).json(&self))
    }
}
