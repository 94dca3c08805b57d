use std::path::PathBuf;

use base64::Engine as _;
use clap::Args;

use recryptor_service::http_server::api::client::ApiError;
use recryptor_service::http_server::api::recrypt_header::RecryptHeaderRequest;

#[derive(Args, Debug, Clone)]
pub struct Recrypt {
    /// File holding the Crypt4GH header encrypted for the user's key
    #[arg(short, long)]
    pub input: PathBuf,

    /// Write the recrypted header (raw bytes) here instead of printing JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecryptOpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Recrypt {
    type Error = RecryptOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let header = tokio::fs::read(&self.input).await?;
        let response = ctx
            .client
            .call(RecryptHeaderRequest {
                crypt4gh_header: base64::engine::general_purpose::STANDARD.encode(header),
            })
            .await?;

        match &self.output {
            Some(path) => {
                let recrypted = base64::engine::general_purpose::STANDARD
                    .decode(&response.crypt4gh_header)
                    .map_err(|e| RecryptOpError::InvalidResponse(e.to_string()))?;
                tokio::fs::write(path, recrypted).await?;
                Ok(format!(
                    "wrote {} for compute keypair {} (expires {})",
                    path.display(),
                    response.crypt4gh_compute_keypair_id,
                    response.crypt4gh_compute_keypair_expiration_date
                ))
            }
            None => serde_json::to_string_pretty(&response)
                .map_err(|e| RecryptOpError::InvalidResponse(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{routing::post, Json, Router};
    use base64::Engine as _;
    use recryptor_service::http_server::api::recrypt_header::RecryptHeaderResponse;
    use url::Url;

    use super::*;
    use crate::cli::op::{Op, OpContext};

    /// User node answering every request by echoing the header back reversed
    async fn echo_node() -> Url {
        let router = Router::new().route(
            "/recrypt_header",
            post(|Json(request): Json<RecryptHeaderRequest>| async move {
                let engine = &base64::engine::general_purpose::STANDARD;
                let mut header = engine.decode(request.crypt4gh_header).unwrap();
                header.reverse();
                Json(RecryptHeaderResponse {
                    crypt4gh_header: engine.encode(header),
                    crypt4gh_compute_keypair_id: "cn:0011aabb".to_string(),
                    crypt4gh_compute_keypair_expiration_date: "2025-01-01T00:00".to_string(),
                })
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        Url::parse(&format!("http://{}", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_output_writes_raw_header() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("header.c4gh");
        let output = temp_dir.path().join("recrypted.c4gh");
        std::fs::write(&input, [0u8, 1, 2, 255]).unwrap();

        let ctx = OpContext::new(echo_node().await, None).unwrap();
        let message = Recrypt {
            input: input.clone(),
            output: Some(output.clone()),
        }
        .execute(&ctx)
        .await
        .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), vec![255u8, 2, 1, 0]);
        assert!(message.contains("cn:0011aabb"));
        assert!(message.contains("2025-01-01T00:00"));
    }

    #[tokio::test]
    async fn test_without_output_prints_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let input = temp_dir.path().join("header.c4gh");
        std::fs::write(&input, [7u8, 8]).unwrap();

        let ctx = OpContext::new(echo_node().await, None).unwrap();
        let printed = Recrypt {
            input,
            output: None,
        }
        .execute(&ctx)
        .await
        .unwrap();

        let response: RecryptHeaderResponse = serde_json::from_str(&printed).unwrap();
        assert_eq!(
            base64::engine::general_purpose::STANDARD
                .decode(response.crypt4gh_header)
                .unwrap(),
            vec![8u8, 7]
        );
    }
}
