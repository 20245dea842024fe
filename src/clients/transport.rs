//! # HTTP Transport
//!
//! Thin `reqwest` wrapper used by the typed clients. It performs one request
//! and reports failures as [`TransportError`]; retries, deadlines and fallbacks
//! belong to the invoker.

use crate::config::{ConfigurationError, TimeoutSettings};
use crate::resilience::TransportError;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeouts: &TimeoutSettings) -> Result<Self, ConfigurationError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ConfigurationError::invalid_value("base_url", base_url, e.to_string())
        })?;

        let client = Client::builder()
            .connect_timeout(timeouts.connect_timeout())
            .timeout(timeouts.attempt_deadline())
            .user_agent(format!("recipe-resilience/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ConfigurationError::validation_error(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        debug!(url = %url, "GET");
        let response = self.client.get(url).send().await.map_err(map_reqwest)?;
        Self::handle_response(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest)?;
        Self::handle_response(response).await
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Decode(format!("invalid request path '{path}': {e}")))
    }

    async fn handle_response<T>(response: Response) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::status(status.as_u16(), body));
        }

        response.json::<T>().await.map_err(map_reqwest)
    }
}

fn map_reqwest(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if let Some(status) = error.status() {
        TransportError::status(status.as_u16(), String::new())
    } else if error.is_decode() || error.is_body() {
        TransportError::Decode(error.to_string())
    } else {
        TransportError::Connect(error.to_string())
    }
}
