//! Network transports.
//!
//! # Design
//! `Transport` executes one `HttpRequest` and returns whatever the server
//! said, including 4xx/5xx. Interpreting statuses is the client's job, so a
//! transport only fails when no response arrived at all.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::error::{ApiError, ErrorBody};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Failure to obtain any response.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("network error: {0}")]
    Network(String),
}

impl TransportError {
    /// Stable code surfaced in the normalized error body.
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::Timeout => "TIMEOUT",
            TransportError::InvalidUrl(_) => "INVALID_URL",
            TransportError::Io(_) => "IO_ERROR",
            TransportError::Network(_) => "NETWORK_ERROR",
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::Transport(ErrorBody::new(err.code(), err.to_string()))
    }
}

pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

/// Blocking transport backed by a shared `ureq::Agent`.
///
/// ureq's status-code-as-error behavior is disabled so 4xx/5xx responses
/// come back as data rather than `Err`. Headers, including `content-type`,
/// are sent exactly as the request carries them.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

fn prepare<B>(mut builder: ureq::RequestBuilder<B>, request: &HttpRequest) -> ureq::RequestBuilder<B> {
    for (key, value) in &request.query {
        builder = builder.query(key, value);
    }
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.as_str();

        let result = match (request.method, request.body.as_deref()) {
            (HttpMethod::Get, _) => prepare(self.agent.get(url), request).call(),
            (HttpMethod::Delete, _) => prepare(self.agent.delete(url), request).call(),
            (HttpMethod::Post, Some(body)) => prepare(self.agent.post(url), request).send(body.as_bytes()),
            (HttpMethod::Post, None) => prepare(self.agent.post(url), request).send_empty(),
            (HttpMethod::Put, Some(body)) => prepare(self.agent.put(url), request).send(body.as_bytes()),
            (HttpMethod::Put, None) => prepare(self.agent.put(url), request).send_empty(),
        };

        let mut response = result.map_err(map_ureq_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.body_mut().read_to_string().map_err(map_ureq_error)?;

        Ok(HttpResponse { status, headers, body })
    }
}

fn map_ureq_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::BadUri(uri) => TransportError::InvalidUrl(uri),
        ureq::Error::Io(e) => TransportError::Io(e.to_string()),
        other => TransportError::Network(other.to_string()),
    }
}
