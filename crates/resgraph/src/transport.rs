//! HTTP transport abstraction.
//!
//! The executor never builds its own client: it is handed a [`Transport`],
//! so tests can swap in canned or failing implementations. Retries and
//! connection pooling belong to the transport, not the executor.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use std::time::Duration;

/// Sends a request and returns the raw response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, request: reqwest::Request) -> Result<reqwest::Response>;
}

/// Production transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    bearer_token: Option<String>,
}

impl ReqwestTransport {
    /// Create a transport with a connect timeout of `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            bearer_token: None,
        }
    }

    /// Attach an access token obtained from the credential provider.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn round_trip(&self, mut request: reqwest::Request) -> Result<reqwest::Response> {
        if let Some(token) = &self.bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(self.client.execute(request).await?)
    }
}
