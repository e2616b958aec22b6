//! Refresh-and-retry behavior against a scripted transport.
//!
//! # Design
//! `Scripted` answers requests from a queue keyed by nothing but order and
//! records every request it saw, so each test states exactly which responses
//! the server gives and then checks what the client sent, what it stored and
//! whether it asked for a login redirect.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cms_client_core::session::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};
use cms_client_core::{
    ApiClient, ApiError, ClientConfig, ErrorKind, HttpMethod, HttpRequest, HttpResponse, MemorySessionStore,
    RecordingNavigator, SessionError, SessionStore, Transport, TransportError,
};

#[derive(Default)]
struct Scripted {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl Scripted {
    fn reply(&self, status: u16, body: &str) {
        self.responses.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }));
    }

    fn fail(&self, err: TransportError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    fn seen(&self) -> Vec<HttpRequest> {
        self.seen.lock().unwrap().clone()
    }

    fn paths(&self) -> Vec<String> {
        self.seen().into_iter().map(|r| r.path).collect()
    }
}

impl Transport for Scripted {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.seen.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected request: script exhausted")
    }
}

const EXPIRED: &str = r#"{"error":{"code":"TOKEN_EXPIRED","message":"access token expired"}}"#;
const NEW_PAIR: &str = r#"{"access_token":"access-2","refresh_token":"refresh-2"}"#;
const USER: &str = r#"{"id":1,"name":"Admin","role":"admin"}"#;

struct Harness {
    transport: Arc<Scripted>,
    session: Arc<MemorySessionStore>,
    navigator: Arc<RecordingNavigator>,
    client: ApiClient<Arc<Scripted>, Arc<MemorySessionStore>, Arc<RecordingNavigator>>,
}

fn harness() -> Harness {
    let transport = Arc::new(Scripted::default());
    let session = Arc::new(MemorySessionStore::new());
    let navigator = Arc::new(RecordingNavigator::new());
    let client = ApiClient::new(
        ClientConfig::new("http://cms.test/api"),
        Arc::clone(&transport),
        Arc::clone(&session),
        Arc::clone(&navigator),
    );
    Harness {
        transport,
        session,
        navigator,
        client,
    }
}

fn logged_in() -> Harness {
    let h = harness();
    h.session.set(ACCESS_TOKEN_KEY, "access-1").unwrap();
    h.session.set(REFRESH_TOKEN_KEY, "refresh-1").unwrap();
    h.session.set(USER_KEY, USER).unwrap();
    h
}

fn assert_session_intact(h: &Harness) {
    assert_eq!(h.session.get(ACCESS_TOKEN_KEY).as_deref(), Some("access-1"));
    assert_eq!(h.session.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-1"));
    assert_eq!(h.session.get(USER_KEY).as_deref(), Some(USER));
    assert_eq!(h.navigator.count(), 0);
}

fn assert_session_cleared(h: &Harness) {
    assert!(h.session.get(ACCESS_TOKEN_KEY).is_none());
    assert!(h.session.get(REFRESH_TOKEN_KEY).is_none());
    assert!(h.session.get(USER_KEY).is_none());
    assert_eq!(h.navigator.redirects(), vec!["/login".to_string()]);
}

// ---------------------------------------------------------------------------
// Public endpoints
// ---------------------------------------------------------------------------

#[test]
fn public_401_rejects_and_keeps_session() {
    let h = logged_in();
    h.transport.reply(401, EXPIRED);

    let err = h.client.get("/articles").unwrap_err();

    assert!(matches!(err, ApiError::UnauthorizedPublic(_)));
    assert_eq!(err.kind(), ErrorKind::UnauthorizedPublic);
    assert_eq!(err.code(), "TOKEN_EXPIRED");
    assert_eq!(h.transport.paths(), vec!["/articles"]);
    assert_session_intact(&h);
}

#[test]
fn anonymous_public_401_does_not_redirect() {
    let h = harness();
    h.transport.reply(401, "");

    let err = h.client.get("/categories/news").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnauthorizedPublic);
    assert_eq!(err.code(), "UNKNOWN_ERROR");
    assert_eq!(h.navigator.count(), 0);
}

#[test]
fn admin_path_matching_allowlist_still_refreshes() {
    let h = logged_in();
    h.transport.reply(401, EXPIRED);
    h.transport.reply(200, NEW_PAIR);
    h.transport.reply(200, "[]");

    let response = h.client.get("/admin/articles").unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(h.transport.paths(), vec!["/admin/articles", "/auth/refresh", "/admin/articles"]);
}

// ---------------------------------------------------------------------------
// Refresh and retry
// ---------------------------------------------------------------------------

#[test]
fn first_401_refreshes_once_and_retries_with_new_token() {
    let h = logged_in();
    h.transport.reply(401, EXPIRED);
    h.transport.reply(200, NEW_PAIR);
    h.transport.reply(200, r#"[{"id":1,"title":"Welcome"}]"#);

    let articles: serde_json::Value = h.client.get_json("/admin/articles").unwrap();
    assert_eq!(articles[0]["title"], "Welcome");

    let seen = h.transport.seen();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].bearer(), Some("access-1"));
    assert!(!seen[0].is_retried());

    let refresh = &seen[1];
    assert_eq!(refresh.method, HttpMethod::Post);
    assert_eq!(refresh.url, "http://cms.test/api/auth/refresh");
    assert!(refresh.bearer().is_none());
    let body: serde_json::Value = serde_json::from_str(refresh.body.as_deref().unwrap()).unwrap();
    assert_eq!(body["refresh_token"], "refresh-1");

    assert_eq!(seen[2].bearer(), Some("access-2"));
    assert!(seen[2].is_retried());

    assert_eq!(h.session.get(ACCESS_TOKEN_KEY).as_deref(), Some("access-2"));
    assert_eq!(h.session.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-2"));
    assert_eq!(h.session.get(USER_KEY).as_deref(), Some(USER));
    assert_eq!(h.navigator.count(), 0);
}

#[test]
fn retry_failure_other_than_401_is_returned_as_is() {
    let h = logged_in();
    h.transport.reply(401, EXPIRED);
    h.transport.reply(200, NEW_PAIR);
    h.transport.reply(500, r#"{"error":{"code":"DB_DOWN","message":"database unavailable"}}"#);

    let err = h.client.delete("/admin/articles/9").unwrap_err();

    assert!(matches!(err, ApiError::HttpError { status: 500, .. }));
    assert_eq!(err.code(), "DB_DOWN");
    assert_eq!(h.session.get(ACCESS_TOKEN_KEY).as_deref(), Some("access-2"));
    assert_eq!(h.navigator.count(), 0);
}

#[test]
fn second_401_after_refresh_clears_session_without_second_refresh() {
    let h = logged_in();
    h.transport.reply(401, EXPIRED);
    h.transport.reply(200, NEW_PAIR);
    h.transport.reply(401, r#"{"error":{"code":"ACCOUNT_LOCKED","message":"locked"}}"#);

    let err = h.client.get("/admin/users").unwrap_err();

    assert!(matches!(err, ApiError::SessionExpired(_)));
    assert_eq!(err.kind(), ErrorKind::SessionExpired);
    assert_eq!(err.code(), "ACCOUNT_LOCKED");
    assert_eq!(h.transport.paths(), vec!["/admin/users", "/auth/refresh", "/admin/users"]);
    assert_session_cleared(&h);
}

#[test]
fn refresh_endpoint_failure_clears_session() {
    let h = logged_in();
    h.transport.reply(401, EXPIRED);
    h.transport.reply(401, r#"{"error":{"code":"INVALID_REFRESH_TOKEN","message":"revoked"}}"#);

    let err = h.client.get("/admin/articles").unwrap_err();

    assert!(matches!(err, ApiError::RefreshFailed(_)));
    assert_eq!(err.kind(), ErrorKind::RefreshFailure);
    assert_eq!(err.code(), "INVALID_REFRESH_TOKEN");
    assert_eq!(h.transport.paths(), vec!["/admin/articles", "/auth/refresh"]);
    assert_session_cleared(&h);
}

#[test]
fn refresh_network_failure_clears_session() {
    let h = logged_in();
    h.transport.reply(401, EXPIRED);
    h.transport.fail(TransportError::Network("connection reset".to_string()));

    let err = h.client.get("/admin/articles").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RefreshFailure);
    assert_eq!(err.code(), "NETWORK_ERROR");
    assert_session_cleared(&h);
}

#[test]
fn missing_refresh_token_clears_session_without_calling_refresh() {
    let h = harness();
    h.session.set(ACCESS_TOKEN_KEY, "access-1").unwrap();
    h.session.set(USER_KEY, USER).unwrap();
    h.transport.reply(401, EXPIRED);

    let err = h.client.get("/admin/articles").unwrap_err();

    assert!(matches!(err, ApiError::SessionExpired(_)));
    assert_eq!(err.code(), "TOKEN_EXPIRED");
    assert_eq!(h.transport.paths(), vec!["/admin/articles"]);
    assert_session_cleared(&h);
}

#[test]
fn anonymous_protected_401_redirects() {
    let h = harness();
    h.transport.reply(401, r#"{"error":{"code":"MISSING_TOKEN","message":"authentication required"}}"#);

    let err = h.client.get("/admin/articles").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SessionExpired);
    assert!(h.transport.seen()[0].bearer().is_none());
    assert_eq!(h.navigator.redirects(), vec!["/login".to_string()]);
}

/// Stands in for another request whose refresh lands while this one is in
/// flight: the rotated pair is stored before the first 401 comes back.
struct RotatedMidFlight {
    inner: Arc<Scripted>,
    session: Arc<MemorySessionStore>,
}

impl Transport for RotatedMidFlight {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        if self.inner.seen().is_empty() {
            self.session.set(ACCESS_TOKEN_KEY, "access-2").unwrap();
            self.session.set(REFRESH_TOKEN_KEY, "refresh-2").unwrap();
        }
        self.inner.execute(request)
    }
}

#[test]
fn token_rotated_by_another_request_is_reused_without_refresh() {
    let h = logged_in();
    let client = ApiClient::new(
        ClientConfig::new("http://cms.test/api"),
        RotatedMidFlight {
            inner: Arc::clone(&h.transport),
            session: Arc::clone(&h.session),
        },
        Arc::clone(&h.session),
        Arc::clone(&h.navigator),
    );
    h.transport.reply(401, EXPIRED);
    h.transport.reply(200, "[]");

    let response = client.get("/admin/articles").unwrap();

    assert_eq!(response.status, 200);
    let seen = h.transport.seen();
    assert_eq!(h.transport.paths(), vec!["/admin/articles", "/admin/articles"]);
    assert_eq!(seen[0].bearer(), Some("access-1"));
    assert_eq!(seen[1].header("Authorization"), Some("Bearer access-2"));
    assert!(seen[1].is_retried());
    assert_eq!(h.session.get(ACCESS_TOKEN_KEY).as_deref(), Some("access-2"));
    assert_eq!(h.session.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-2"));
    assert_eq!(h.navigator.count(), 0);
}

#[test]
fn later_requests_use_refreshed_token() {
    let h = logged_in();
    h.transport.reply(401, EXPIRED);
    h.transport.reply(200, NEW_PAIR);
    h.transport.reply(200, "[]");
    h.transport.reply(200, "{}");

    h.client.get("/admin/articles").unwrap();
    h.client.get("/admin/stats").unwrap();

    let seen = h.transport.seen();
    assert_eq!(seen[3].bearer(), Some("access-2"));
    assert!(!seen[3].is_retried());
}

// ---------------------------------------------------------------------------
// Pass-through failures
// ---------------------------------------------------------------------------

#[test]
fn non_401_statuses_never_touch_session() {
    for status in [400, 403, 404, 422, 500, 503] {
        let h = logged_in();
        h.transport.reply(status, r#"{"error":{"code":"X","message":"nope","details":{"field":"title"}}}"#);

        let err = h.client.post("/admin/articles", &serde_json::json!({})).unwrap_err();

        assert_eq!(err.status(), Some(status));
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.details(), Some(serde_json::json!({"field": "title"})));
        assert_eq!(h.transport.seen().len(), 1, "status {status} must not refresh");
        assert_session_intact(&h);
    }
}

#[test]
fn network_failure_passes_through() {
    let h = logged_in();
    h.transport.fail(TransportError::Timeout);

    let err = h.client.get("/admin/articles").unwrap_err();

    assert!(matches!(err, ApiError::Transport(_)));
    assert_eq!(err.code(), "TIMEOUT");
    assert_session_intact(&h);
}

// ---------------------------------------------------------------------------
// Login / logout / explicit refresh
// ---------------------------------------------------------------------------

#[test]
fn login_persists_tokens_and_profile() {
    let h = harness();
    h.transport.reply(
        200,
        &format!(r#"{{"access_token":"access-1","refresh_token":"refresh-1","user":{USER}}}"#),
    );

    let login = h
        .client
        .login(&cms_client_core::LoginRequest {
            email: "admin@example.com".to_string(),
            password: "admin123".to_string(),
        })
        .unwrap();

    assert_eq!(login.user["role"], "admin");
    assert_eq!(h.session.get(ACCESS_TOKEN_KEY).as_deref(), Some("access-1"));
    assert_eq!(h.session.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-1"));
    assert_eq!(h.client.current_user().unwrap()["name"], "Admin");
}

/// Accepts tokens but cannot persist the user profile.
#[derive(Default)]
struct ProfileWriteFails(MemorySessionStore);

impl SessionStore for ProfileWriteFails {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        if key == USER_KEY {
            return Err(SessionError::Io(std::io::Error::other("disk full")));
        }
        self.0.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.0.remove(key)
    }
}

#[test]
fn login_storage_failure_leaves_no_partial_session() {
    let transport = Arc::new(Scripted::default());
    let session = Arc::new(ProfileWriteFails::default());
    let navigator = Arc::new(RecordingNavigator::new());
    let client = ApiClient::new(
        ClientConfig::new("http://cms.test/api"),
        Arc::clone(&transport),
        Arc::clone(&session),
        Arc::clone(&navigator),
    );
    transport.reply(
        200,
        &format!(r#"{{"access_token":"access-1","refresh_token":"refresh-1","user":{USER}}}"#),
    );

    let err = client
        .login(&cms_client_core::LoginRequest {
            email: "admin@example.com".to_string(),
            password: "admin123".to_string(),
        })
        .unwrap_err();

    assert!(matches!(err, ApiError::Storage(_)));
    assert_eq!(err.code(), "STORAGE_ERROR");
    assert!(session.get(ACCESS_TOKEN_KEY).is_none());
    assert!(session.get(REFRESH_TOKEN_KEY).is_none());
    assert!(session.get(USER_KEY).is_none());
    assert!(!client.is_authenticated());
    assert_eq!(navigator.count(), 0);
}

#[test]
fn bad_credentials_do_not_trigger_refresh_or_redirect() {
    let h = harness();
    h.transport.reply(401, r#"{"error":{"code":"INVALID_CREDENTIALS","message":"wrong password"}}"#);

    let err = h
        .client
        .login(&cms_client_core::LoginRequest {
            email: "admin@example.com".to_string(),
            password: "wrong".to_string(),
        })
        .unwrap_err();

    assert!(matches!(err, ApiError::HttpError { status: 401, .. }));
    assert_eq!(err.code(), "INVALID_CREDENTIALS");
    assert_eq!(h.transport.seen().len(), 1);
    assert_eq!(h.navigator.count(), 0);
}

#[test]
fn logout_ignores_server_failure_and_clears_locally() {
    let h = logged_in();
    h.transport.reply(500, "");

    h.client.logout();

    let seen = h.transport.seen();
    assert_eq!(seen[0].path, "/auth/logout");
    assert!(seen[0].body.as_deref().unwrap().contains("refresh-1"));
    assert!(h.session.get(ACCESS_TOKEN_KEY).is_none());
    assert!(h.session.get(USER_KEY).is_none());
    assert_eq!(h.navigator.count(), 0);
}

#[test]
fn logout_without_session_makes_no_call() {
    let h = harness();
    h.client.logout();
    assert!(h.transport.seen().is_empty());
}

#[test]
fn explicit_refresh_failure_leaves_session_alone() {
    let h = logged_in();
    h.transport.reply(401, r#"{"error":{"code":"INVALID_REFRESH_TOKEN","message":"revoked"}}"#);

    let err = h.client.refresh().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RefreshFailure);
    assert_session_intact(&h);
}

#[test]
fn explicit_refresh_rotates_pair() {
    let h = logged_in();
    h.transport.reply(200, NEW_PAIR);

    let pair = h.client.refresh().unwrap();

    assert_eq!(pair.access_token, "access-2");
    assert_eq!(h.session.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-2"));
}
