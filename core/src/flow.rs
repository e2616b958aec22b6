//! Failure classification for the refresh-and-retry cycle.
//!
//! # Design
//! `decide` is a pure function of the failed status, the request path, the
//! retried flag and the public-endpoint policy. `ApiClient` acts on the
//! returned tag; nothing here performs I/O, so every branch can be checked
//! without a transport.

use std::fmt;

use crate::policy::PublicEndpoints;

pub const UNAUTHORIZED: u16 = 401;

/// What to do with a non-2xx response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// 401 on a public endpoint: reject, keep the session.
    Public,
    /// First 401 on a protected endpoint: refresh, then retry once.
    FirstUnauthorized,
    /// 401 on a request that was already retried: clear session, redirect.
    RetryExhausted,
    /// Anything other than 401: pass through.
    Other,
}

/// Rules are evaluated in order: non-401, public path, already retried.
pub fn decide(status: u16, path: &str, retried: bool, policy: &PublicEndpoints) -> AuthDecision {
    if status != UNAUTHORIZED {
        return AuthDecision::Other;
    }
    if policy.is_public(path) {
        return AuthDecision::Public;
    }
    if retried {
        return AuthDecision::RetryExhausted;
    }
    AuthDecision::FirstUnauthorized
}

/// Lifecycle of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Initial,
    AwaitingResponse,
    Success,
    UnauthorizedPublic,
    UnauthorizedRefreshing,
    UnauthorizedRetryFailed,
    OtherError,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RequestState::Initial | RequestState::AwaitingResponse | RequestState::UnauthorizedRefreshing
        )
    }
}

impl From<AuthDecision> for RequestState {
    fn from(decision: AuthDecision) -> Self {
        match decision {
            AuthDecision::Public => RequestState::UnauthorizedPublic,
            AuthDecision::FirstUnauthorized => RequestState::UnauthorizedRefreshing,
            AuthDecision::RetryExhausted => RequestState::UnauthorizedRetryFailed,
            AuthDecision::Other => RequestState::OtherError,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Initial => "INITIAL",
            RequestState::AwaitingResponse => "AWAITING_RESPONSE",
            RequestState::Success => "SUCCESS",
            RequestState::UnauthorizedPublic => "UNAUTHORIZED_PUBLIC",
            RequestState::UnauthorizedRefreshing => "UNAUTHORIZED_REFRESHING",
            RequestState::UnauthorizedRetryFailed => "UNAUTHORIZED_RETRY_FAILED",
            RequestState::OtherError => "OTHER_ERROR",
        };
        f.write_str(name)
    }
}
