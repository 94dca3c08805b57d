use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::SecondsFormat;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::keypair::{parse_expiration, KeypairError, PublicKeyMaterial};

use super::detail;
use crate::http_server::api::client::{ApiClient, ApiError, ApiRequest};
use crate::recrypt::{ComputeKeyInfo, KeyInfoError, KeyInfoSource};
use crate::service_state::ComputeState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetComputeKeyInfoRequest {
    /// Armored public key the caller encrypted for
    pub crypt4gh_user_public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetComputeKeyInfoResponse {
    pub crypt4gh_compute_keypair_id: String,
    /// RFC 3339, UTC
    pub crypt4gh_compute_keypair_expiration_date: String,
}

pub async fn handler(
    State(state): State<ComputeState>,
    payload: Result<Json<GetComputeKeyInfoRequest>, JsonRejection>,
) -> Result<impl IntoResponse, KeyInfoHandlerError> {
    let Json(req) = payload.map_err(|e| KeyInfoHandlerError::InvalidRequest(e.body_text()))?;

    let info = state
        .keypairs()
        .key_info_for(&req.crypt4gh_user_public_key, state.verify_public_key())
        .await?;

    tracing::debug!(id = %info.id, "key info served");
    Ok((
        StatusCode::OK,
        Json(GetComputeKeyInfoResponse {
            crypt4gh_compute_keypair_id: info.id.to_string(),
            crypt4gh_compute_keypair_expiration_date: info
                .expiration
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        }),
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum KeyInfoHandlerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Keypair(#[from] KeypairError),
}

impl IntoResponse for KeyInfoHandlerError {
    fn into_response(self) -> Response {
        match self {
            KeyInfoHandlerError::InvalidRequest(reason) => {
                tracing::info!(%reason, "key info request rejected");
                detail(StatusCode::BAD_REQUEST, reason)
            }
            KeyInfoHandlerError::Keypair(KeypairError::InvalidPublicKey(reason)) => {
                tracing::info!(%reason, "key info request rejected");
                detail(StatusCode::BAD_REQUEST, "Invalid public key")
            }
            KeyInfoHandlerError::Keypair(KeypairError::Mismatch { current, supplied }) => {
                tracing::warn!(%current, %supplied, "caller presented a stale compute key");
                detail(
                    StatusCode::CONFLICT,
                    format!(
                        "Public key {} is not the current compute key {}",
                        supplied, current
                    ),
                )
            }
            KeyInfoHandlerError::Keypair(e @ KeypairError::RotationInProgress { .. }) => {
                tracing::warn!(error = %e, "key info requested during rotation");
                detail(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Compute keypair rotation in progress",
                )
            }
            KeyInfoHandlerError::Keypair(e) => {
                tracing::error!(error = ?e, "key info request failed");
                detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl ApiRequest for GetComputeKeyInfoRequest {
    type Response = GetComputeKeyInfoResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        Ok(client
            .post(base_url.join("/get_compute_key_info")?)
            .json(&self))
    }
}

impl From<ApiError> for KeyInfoError {
    fn from(err: ApiError) -> Self {
        if err.is_timeout() {
            return KeyInfoError::Timeout;
        }
        match err {
            ApiError::HttpStatus(status, body) => KeyInfoError::Rejected {
                status: status.as_u16(),
                body,
            },
            ApiError::Reqwest(e) if e.is_decode() => KeyInfoError::InvalidResponse(e.to_string()),
            other => KeyInfoError::Unreachable(other.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl KeyInfoSource for ApiClient {
    async fn compute_key_info(
        &self,
        public_key: &PublicKeyMaterial,
    ) -> Result<ComputeKeyInfo, KeyInfoError> {
        let response = self
            .call(GetComputeKeyInfoRequest {
                crypt4gh_user_public_key: public_key.as_str().to_string(),
            })
            .await?;

        let expiration = parse_expiration(&response.crypt4gh_compute_keypair_expiration_date)
            .map_err(|e| KeyInfoError::InvalidResponse(e.to_string()))?;

        Ok(ComputeKeyInfo {
            id: response.crypt4gh_compute_keypair_id,
            expiration,
        })
    }
}
