//! Error types for the CMS API client.
//!
//! # Design
//! Every failure a caller sees carries the same normalized shape,
//! `ErrorBody { code, message, details }`. When the server answered with its
//! structured envelope (`{"error": {...}}`) that body is surfaced verbatim;
//! otherwise one is synthesized from the status or transport failure.
//!
//! The enum variant records which branch of the authorization handling
//! produced the error, so callers can tell a soft public-endpoint 401 from a
//! session that was torn down.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::http::HttpResponse;

pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
pub const CLIENT_ERROR: &str = "CLIENT_ERROR";
pub const STORAGE_ERROR: &str = "STORAGE_ERROR";

/// Normalized error payload, identical to the server's `error` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Extract the server envelope from a failed response, or synthesize an
    /// `UNKNOWN_ERROR` body from the status and raw text.
    ///
    /// An envelope missing `code` or `message` keeps whatever fields it does
    /// carry; only the absent ones are filled in.
    pub fn from_response(response: &HttpResponse) -> Self {
        if let Some(body) = Self::from_envelope(response) {
            return body;
        }
        let text = response.body.trim();
        let message = if text.is_empty() {
            Self::status_message(response.status)
        } else {
            text.to_string()
        };
        Self::new(UNKNOWN_ERROR, message)
    }

    fn from_envelope(response: &HttpResponse) -> Option<Self> {
        let value: Value = serde_json::from_str(&response.body).ok()?;
        let error = value.get("error")?.as_object()?;
        let code = error.get("code").and_then(Value::as_str).unwrap_or(UNKNOWN_ERROR);
        let message = match error.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => Self::status_message(response.status),
        };
        Some(Self {
            code: code.to_string(),
            message,
            details: error.get("details").filter(|d| !d.is_null()).cloned(),
        })
    }

    fn status_message(status: u16) -> String {
        format!("request failed with status {status}")
    }
}

/// Which part of the error taxonomy an `ApiError` belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 401 from a public endpoint. Session left untouched.
    UnauthorizedPublic,
    /// 401 that could not be recovered. Session cleared, login redirect issued.
    SessionExpired,
    /// The refresh endpoint itself failed. Session cleared, login redirect issued.
    RefreshFailure,
    /// Any other HTTP or network failure, passed through unchanged.
    Transport,
    /// The request could not be built or the response could not be read.
    Client,
}

/// Errors returned by `ApiClient`.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("unauthorized on public endpoint ({}): {}", .0.code, .0.message)]
    UnauthorizedPublic(ErrorBody),

    #[error("session expired ({}): {}", .0.code, .0.message)]
    SessionExpired(ErrorBody),

    #[error("token refresh failed ({}): {}", .0.code, .0.message)]
    RefreshFailed(ErrorBody),

    /// The server returned a non-2xx status that needs no session handling.
    #[error("HTTP {status} ({}): {}", .error.code, .error.message)]
    HttpError { status: u16, error: ErrorBody },

    /// No response was received.
    #[error("transport error ({}): {}", .0.code, .0.message)]
    Transport(ErrorBody),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The session store could not persist credentials.
    #[error("session storage failed: {0}")]
    Storage(String),
}

impl ApiError {
    pub(crate) fn from_response(response: &HttpResponse) -> Self {
        ApiError::HttpError {
            status: response.status,
            error: ErrorBody::from_response(response),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::UnauthorizedPublic(_) => ErrorKind::UnauthorizedPublic,
            ApiError::SessionExpired(_) => ErrorKind::SessionExpired,
            ApiError::RefreshFailed(_) => ErrorKind::RefreshFailure,
            ApiError::HttpError { .. } | ApiError::Transport(_) => ErrorKind::Transport,
            ApiError::DeserializationError(_)
            | ApiError::SerializationError(_)
            | ApiError::Storage(_) => ErrorKind::Client,
        }
    }

    /// HTTP status of the response that caused this error, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::UnauthorizedPublic(_) | ApiError::SessionExpired(_) => Some(401),
            ApiError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The normalized `{ code, message, details }` shape.
    pub fn body(&self) -> ErrorBody {
        match self {
            ApiError::UnauthorizedPublic(body)
            | ApiError::SessionExpired(body)
            | ApiError::RefreshFailed(body)
            | ApiError::Transport(body)
            | ApiError::HttpError { error: body, .. } => body.clone(),
            ApiError::DeserializationError(msg) | ApiError::SerializationError(msg) => {
                ErrorBody::new(CLIENT_ERROR, msg.clone())
            }
            ApiError::Storage(msg) => ErrorBody::new(STORAGE_ERROR, msg.clone()),
        }
    }

    pub fn code(&self) -> String {
        self.body().code
    }

    pub fn message(&self) -> String {
        self.body().message
    }

    pub fn details(&self) -> Option<Value> {
        self.body().details
    }
}
