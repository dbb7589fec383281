use std::{future::Future, time::Duration};

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::{errors::BoxError, request::PhysicalRequest};

/// Performs one physical request against one instance.
///
/// Implementations must stop work and return promptly once `cancel` fires; the hedging
/// client cancels the token of every attempt that lost the race.
pub trait Transport: Send + Sync + 'static {
    /// What a successful attempt produces.
    type Response: Send + 'static;

    fn send(
        &self,
        request: PhysicalRequest,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Self::Response, BoxError>> + Send;
}

/// Fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(thiserror::Error, Debug)]
pub enum HttpTransportError {
    #[error("attempt cancelled")]
    Cancelled,

    #[error("instance answered with status {0}")]
    Status(StatusCode),

    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

/// [`Transport`] backed by a shared `reqwest` client.
///
/// Any well-formed response wins by default, whatever its status. Call
/// [`HttpTransport::require_success`] to treat non-2xx answers as failed attempts.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    require_success: bool,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::from_client(reqwest::Client::new())
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport whose attempts each give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpTransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            client,
            require_success: false,
        }
    }

    pub fn require_success(mut self) -> Self {
        self.require_success = true;
        self
    }

    async fn execute(&self, request: PhysicalRequest) -> Result<HttpResponse, HttpTransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.uri.to_string())
            .headers(request.wire_headers());
        if let Some(bytes) = request.body.as_bytes() {
            builder = builder.body(bytes.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        if self.require_success && !status.is_success() {
            return Err(HttpTransportError::Status(status));
        }

        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport {
    type Response = HttpResponse;

    async fn send(
        &self,
        request: PhysicalRequest,
        cancel: CancellationToken,
    ) -> Result<HttpResponse, BoxError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(HttpTransportError::Cancelled.into()),
            result = self.execute(request) => result.map_err(Into::into),
        }
    }
}
