//! Network strategy over an abstract HTTP transport.
//!
//! The engine only needs "send this request, give me status and body". The
//! [`HttpTransport`] trait is that seam; [`ReqwestTransport`] is a thin
//! adapter for real deployments and tests plug in their own.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opflow_core::Outcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Strategy;

// ---------------------------------------------------------------------------
// Request / reply
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// JSON body, sent with `Content-Type: application/json`.
    pub body: Option<Value>,
}

impl HttpRequest {
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Request(String),
}

/// Sends one HTTP request.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no reply was received. Non-2xx
    /// replies are not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError>;
}

// ---------------------------------------------------------------------------
// NetworkStrategy
// ---------------------------------------------------------------------------

/// Strategy performing one HTTP request. Reports the status code verbatim
/// with the body as payload.
pub struct NetworkStrategy {
    transport: Arc<dyn HttpTransport>,
    request: HttpRequest,
}

impl NetworkStrategy {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, request: HttpRequest) -> Self {
        Self { transport, request }
    }

    #[must_use]
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }
}

#[async_trait]
impl Strategy for NetworkStrategy {
    type Output = String;

    async fn execute(&mut self) -> Outcome<String> {
        tracing::debug!(method = %self.request.method, url = %self.request.url, "sending request");
        match self.transport.send(self.request.clone()).await {
            Ok(reply) => Outcome::response(reply.status, reply.body),
            Err(err) => {
                tracing::info!(url = %self.request.url, error = %err, "request failed");
                Outcome::transport_failure(err.to_string())
            }
        }
    }

    fn name(&self) -> &'static str {
        "network"
    }
}

// ---------------------------------------------------------------------------
// ReqwestTransport
// ---------------------------------------------------------------------------

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the TLS backend cannot be
    /// initialized.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self { client })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Put => self.client.put(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(HttpReply { status, body })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
