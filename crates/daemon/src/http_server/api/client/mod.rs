use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

mod client;
mod error;

pub use client::ApiClient;
pub use error::ApiError;

/// A typed request against one of the service's HTTP endpoints
pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, base_url: &Url, client: &Client)
        -> Result<RequestBuilder, url::ParseError>;
}
