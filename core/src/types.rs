//! Auth DTOs exchanged with the CMS API.
//!
//! # Design
//! These mirror the mock-server's schema but are defined independently;
//! integration tests catch drift between the two crates. The user profile is
//! kept as raw JSON because the client never interprets it, it only caches it
//! under the `user` key for views that do.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request payload for `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response payload of `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: Value,
}

/// Request payload for `POST /auth/refresh` and `POST /auth/logout`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}
