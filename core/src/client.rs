//! Authenticated client for the CMS API.
//!
//! # Design
//! `ApiClient` wraps a `Transport` and adds two behaviors around every call:
//!
//! 1. Before dispatch, the stored access token (if any) is attached as
//!    `Authorization: Bearer <token>`.
//! 2. After a 401, `flow::decide` picks a branch: public endpoints reject
//!    without touching the session; a first 401 on a protected endpoint
//!    refreshes the token pair and re-issues the request exactly once; a 401
//!    on an already retried request, or any refresh failure, clears the
//!    session and asks the `Navigator` for a login redirect. Every other
//!    failure passes through unchanged.
//!
//! Refresh is single-flight: it runs under `refresh_lock`, and a request that
//! waited on the lock retries with whatever token the winner stored instead
//! of spending the (already rotated) refresh token a second time.
//!
//! Auth endpoints (login, refresh, logout) bypass both behaviors.

use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, ErrorBody};
use crate::flow::{self, AuthDecision, RequestState};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, CONTENT_TYPE};
use crate::navigator::Navigator;
use crate::session::{SessionStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};
use crate::transport::{Transport, UreqTransport};
use crate::types::{LoginRequest, LoginResponse, RefreshRequest, TokenPair};

/// Optional parts of a request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

pub struct ApiClient<T, S, N> {
    config: ClientConfig,
    transport: T,
    session: S,
    navigator: N,
    refresh_lock: Mutex<()>,
}

impl<S: SessionStore, N: Navigator> ApiClient<UreqTransport, S, N> {
    /// Client over a ureq agent honoring `config.timeout`.
    pub fn with_ureq(config: ClientConfig, session: S, navigator: N) -> Self {
        let transport = UreqTransport::new(config.timeout);
        Self::new(config, transport, session, navigator)
    }
}

impl<T: Transport, S: SessionStore, N: Navigator> ApiClient<T, S, N> {
    pub fn new(config: ClientConfig, transport: T, session: S, navigator: N) -> Self {
        Self {
            config,
            transport,
            session,
            navigator,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Issue one logical request, refreshing and retrying at most once.
    pub fn request(&self, method: HttpMethod, path: &str, options: RequestOptions) -> Result<HttpResponse, ApiError> {
        let mut req = self.build_request(method, path, options)?;
        let sent_with = self.attach_credentials(&mut req);
        debug!(method = %req.method, path = %req.path, authenticated = sent_with.is_some(), state = %RequestState::Initial, "request built");

        loop {
            debug!(method = %req.method, path = %req.path, retried = req.is_retried(), state = %RequestState::AwaitingResponse, "dispatching request");
            let response = self.transport.execute(&req)?;
            if response.is_success() {
                debug!(path = %req.path, status = response.status, state = %RequestState::Success, "request succeeded");
                return Ok(response);
            }

            let decision = flow::decide(response.status, &req.path, req.is_retried(), &self.config.public_endpoints);
            let state = RequestState::from(decision);
            debug!(path = %req.path, status = response.status, %state, terminal = state.is_terminal(), "request failed");

            match decision {
                AuthDecision::Other => return Err(ApiError::from_response(&response)),
                AuthDecision::Public => {
                    return Err(ApiError::UnauthorizedPublic(ErrorBody::from_response(&response)));
                }
                AuthDecision::RetryExhausted => {
                    warn!(path = %req.path, "still unauthorized after refresh");
                    self.end_session();
                    return Err(ApiError::SessionExpired(ErrorBody::from_response(&response)));
                }
                AuthDecision::FirstUnauthorized => {
                    req.mark_retried();
                    let token = self.refresh_for(sent_with.as_deref(), &response)?;
                    req.set_bearer(&token);
                }
            }
        }
    }

    pub fn get(&self, path: &str) -> Result<HttpResponse, ApiError> {
        self.request(HttpMethod::Get, path, RequestOptions::new())
    }

    pub fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<HttpResponse, ApiError> {
        self.request(HttpMethod::Post, path, RequestOptions::new().json(to_value(body)?))
    }

    pub fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<HttpResponse, ApiError> {
        self.request(HttpMethod::Put, path, RequestOptions::new().json(to_value(body)?))
    }

    pub fn delete(&self, path: &str) -> Result<HttpResponse, ApiError> {
        self.request(HttpMethod::Delete, path, RequestOptions::new())
    }

    pub fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        self.get(path)?.json()
    }

    pub fn post_json<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, ApiError> {
        self.post(path, body)?.json()
    }

    pub fn put_json<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, ApiError> {
        self.put(path, body)?.json()
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Exchange credentials for a token pair and cache the user profile.
    pub fn login(&self, credentials: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let response = self.send_unauthenticated(HttpMethod::Post, &self.config.login_path, Some(to_value(credentials)?))?;
        let login: LoginResponse = response.json()?;

        let user = serde_json::to_string(&login.user).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        let stored = self
            .session
            .set(ACCESS_TOKEN_KEY, &login.access_token)
            .and_then(|()| self.session.set(REFRESH_TOKEN_KEY, &login.refresh_token))
            .and_then(|()| self.session.set(USER_KEY, &user));
        if let Err(err) = stored {
            // Never leave a half-written session behind.
            if let Err(clear_err) = self.session.clear() {
                warn!(error = %clear_err, "failed to clear partial session");
            }
            return Err(ApiError::Storage(err.to_string()));
        }

        info!("logged in");
        Ok(login)
    }

    /// Best-effort server logout, then drop local credentials. No redirect.
    pub fn logout(&self) {
        if let Some(refresh_token) = self.session.get(REFRESH_TOKEN_KEY) {
            let body = RefreshRequest { refresh_token };
            let result = to_value(&body)
                .and_then(|body| self.send_unauthenticated(HttpMethod::Post, &self.config.logout_path, Some(body)));
            if let Err(err) = result {
                debug!(error = %err, "server logout failed, ignoring");
            }
        }
        if let Err(err) = self.session.clear() {
            warn!(error = %err, "failed to clear session");
        }
        info!("logged out");
    }

    /// Rotate the token pair now. Failures are returned without clearing the
    /// session; only the 401 path tears it down.
    pub fn refresh(&self) -> Result<TokenPair, ApiError> {
        let _guard = self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let refresh_token = self
            .session
            .get(REFRESH_TOKEN_KEY)
            .ok_or_else(|| ApiError::RefreshFailed(ErrorBody::new("NO_REFRESH_TOKEN", "no refresh token stored")))?;
        let pair = self.exchange_refresh_token(&refresh_token).map_err(|e| ApiError::RefreshFailed(e.body()))?;
        self.store_tokens(&pair);
        Ok(pair)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.get(ACCESS_TOKEN_KEY).is_some()
    }

    /// Cached profile from the last login, if it parses.
    pub fn current_user(&self) -> Option<Value> {
        let raw = self.session.get(USER_KEY)?;
        serde_json::from_str(&raw).ok()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn build_request(&self, method: HttpMethod, path: &str, options: RequestOptions) -> Result<HttpRequest, ApiError> {
        let mut req = HttpRequest::new(method, path, self.config.resolve_url(path));
        req.query = options.query;
        req.headers = options.headers;
        if let Some(body) = options.body {
            let body = serde_json::to_string(&body).map_err(|e| ApiError::SerializationError(e.to_string()))?;
            if req.header(CONTENT_TYPE).is_none() {
                req.set_header(CONTENT_TYPE, "application/json");
            }
            req.body = Some(body);
        }
        Ok(req)
    }

    /// Returns the token that was attached, for the single-flight check.
    fn attach_credentials(&self, req: &mut HttpRequest) -> Option<String> {
        let token = self.session.get(ACCESS_TOKEN_KEY)?;
        req.set_bearer(&token);
        Some(token)
    }

    fn send_unauthenticated(&self, method: HttpMethod, path: &str, body: Option<Value>) -> Result<HttpResponse, ApiError> {
        let options = RequestOptions { body, ..RequestOptions::default() };
        let req = self.build_request(method, path, options)?;
        let response = self.transport.execute(&req)?;
        check_status(response)
    }

    fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let body = to_value(&RefreshRequest {
            refresh_token: refresh_token.to_string(),
        })?;
        self.send_unauthenticated(HttpMethod::Post, &self.config.refresh_path, Some(body))?.json()
    }

    /// Produce a usable access token after a 401, or tear the session down.
    fn refresh_for(&self, sent_with: Option<&str>, unauthorized: &HttpResponse) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = self.session.get(ACCESS_TOKEN_KEY) {
            if sent_with != Some(current.as_str()) {
                debug!("access token rotated by a concurrent refresh");
                return Ok(current);
            }
        }

        let Some(refresh_token) = self.session.get(REFRESH_TOKEN_KEY) else {
            warn!("unauthorized with no refresh token stored");
            self.end_session();
            return Err(ApiError::SessionExpired(ErrorBody::from_response(unauthorized)));
        };

        info!("refreshing access token");
        match self.exchange_refresh_token(&refresh_token) {
            Ok(pair) => {
                self.store_tokens(&pair);
                info!("access token refreshed");
                Ok(pair.access_token)
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed");
                self.end_session();
                Err(ApiError::RefreshFailed(err.body()))
            }
        }
    }

    fn store_tokens(&self, pair: &TokenPair) {
        let result = self
            .session
            .set(ACCESS_TOKEN_KEY, &pair.access_token)
            .and_then(|()| self.session.set(REFRESH_TOKEN_KEY, &pair.refresh_token));
        if let Err(err) = result {
            warn!(error = %err, "failed to persist refreshed tokens");
        }
    }

    fn end_session(&self) {
        if let Err(err) = self.session.clear() {
            warn!(error = %err, "failed to clear session");
        }
        info!(login_route = %self.config.login_route, state = %RequestState::UnauthorizedRetryFailed, "session ended, redirecting to login");
        self.navigator.redirect_to_login(&self.config.login_route);
    }
}

fn to_value<B: Serialize>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::SerializationError(e.to_string()))
}

/// Map non-success statuses to `ApiError::HttpError`.
fn check_status(response: HttpResponse) -> Result<HttpResponse, ApiError> {
    if response.is_success() {
        return Ok(response);
    }
    Err(ApiError::from_response(&response))
}
