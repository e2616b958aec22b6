//! HTTP transport types shared by the client and its transports.
//!
//! # Design
//! Requests and responses are plain data. `ApiClient` builds and mutates
//! `HttpRequest` values (credential header, retried flag) and interprets
//! `HttpResponse` values; a `Transport` is the only thing that touches the
//! network. Keeping the boundary explicit lets the refresh-and-retry logic be
//! exercised against a scripted transport in tests.
//!
//! All fields use owned types (`String`, `Vec`) so requests can be recorded,
//! cloned and replayed without lifetime concerns.

use std::fmt;

use serde::de::DeserializeOwned;

use crate::error::ApiError;

pub const AUTHORIZATION: &str = "Authorization";
pub const CONTENT_TYPE: &str = "content-type";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
///
/// `path` is the path exactly as the caller passed it (relative or absolute)
/// and is what the public-endpoint policy inspects. `url` is the resolved
/// absolute URL the transport dials.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    retried: bool,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            retried: false,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace any existing header with the same (case-insensitive) name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn set_bearer(&mut self, token: &str) {
        self.set_header(AUTHORIZATION, format!("Bearer {token}"));
    }

    /// Token currently carried in the `Authorization` header, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.header(AUTHORIZATION).and_then(|v| v.strip_prefix("Bearer "))
    }

    /// Whether this request has already been through one refresh cycle.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
    }
}
