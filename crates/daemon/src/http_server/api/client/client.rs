use std::time::Duration;

use reqwest::{header::HeaderMap, header::HeaderValue, Certificate, Client};
use url::Url;

use super::error::ApiError;
use super::ApiRequest;

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        Self::with_options(remote, None, None)
    }

    /// Client trusting an extra root certificate (PEM) and bounding every
    /// request by `timeout`.
    pub fn with_options(
        remote: &Url,
        root_ca: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let mut builder = Client::builder().default_headers(default_headers);

        if let Some(pem) = root_ca {
            builder = builder.add_root_certificate(Certificate::from_pem(pem)?);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            remote: remote.clone(),
            client: builder.build()?,
        })
    }

    pub async fn call<T: ApiRequest>(&self, request: T) -> Result<T::Response, ApiError> {
        let request_builder = request.build_request(&self.remote, &self.client)?;
        let response = request_builder.send().await?;

        if response.status().is_success() {
            Ok(response.json::<T::Response>().await?)
        } else {
            Err(ApiError::HttpStatus(
                response.status(),
                response.text().await?,
            ))
        }
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    /// Get the underlying HTTP client for custom requests
    pub fn http_client(&self) -> &Client {
        &self.client
    }
}
