//! In-memory CMS API used to exercise the client end to end.
//!
//! Serves the auth endpoints, public article/category listings and admin
//! article CRUD under `/api`. Errors use the `{"error": {code, message}}`
//! envelope. A `/__control` scope lets tests expire or revoke tokens and read
//! call counters.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const READER_EMAIL: &str = "reader@example.com";
pub const READER_PASSWORD: &str = "reader123";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub category: String,
    pub published: bool,
}

#[derive(Deserialize)]
pub struct CreateArticle {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub published: bool,
}

#[derive(Deserialize)]
pub struct UpdateArticle {
    pub title: Option<String>,
    pub body: Option<String>,
    pub category: Option<String>,
    pub published: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
}

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshBody {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

/// Call counters exposed at `/__control/stats`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    pub logins: usize,
    pub refreshes: usize,
    pub failed_refreshes: usize,
    pub logouts: usize,
}

struct Account {
    user: User,
    password: String,
}

#[derive(Default)]
struct Tokens {
    access: HashMap<String, Uuid>,
    refresh: HashMap<String, Uuid>,
}

pub struct AppState {
    accounts: Vec<Account>,
    articles: RwLock<HashMap<Uuid, Article>>,
    tokens: RwLock<Tokens>,
    stats: RwLock<Stats>,
}

pub type Db = Arc<AppState>;

impl AppState {
    fn seeded() -> Self {
        let account = |email: &str, password: &str, name: &str, role: &str| Account {
            user: User {
                id: Uuid::new_v4(),
                email: email.to_string(),
                name: name.to_string(),
                role: role.to_string(),
            },
            password: password.to_string(),
        };
        let article = |title: &str, category: &str, published: bool| Article {
            id: Uuid::new_v4(),
            title: title.to_string(),
            body: format!("{title} body"),
            category: category.to_string(),
            published,
        };

        let articles = [
            article("Welcome", "news", true),
            article("Match report", "sport", true),
            article("Draft editorial", "opinion", false),
        ];

        Self {
            accounts: vec![
                account(ADMIN_EMAIL, ADMIN_PASSWORD, "Administrator", "admin"),
                account(READER_EMAIL, READER_PASSWORD, "Reader", "reader"),
            ],
            articles: RwLock::new(articles.into_iter().map(|a| (a.id, a)).collect()),
            tokens: RwLock::new(Tokens::default()),
            stats: RwLock::new(Stats::default()),
        }
    }

    fn user(&self, id: Uuid) -> Option<&User> {
        self.accounts.iter().map(|a| &a.user).find(|u| u.id == id)
    }

    async fn issue_tokens(&self, user_id: Uuid) -> TokenResponse {
        let pair = TokenResponse {
            access_token: format!("at-{}", Uuid::new_v4()),
            refresh_token: format!("rt-{}", Uuid::new_v4()),
        };
        let mut tokens = self.tokens.write().await;
        tokens.access.insert(pair.access_token.clone(), user_id);
        tokens.refresh.insert(pair.refresh_token.clone(), user_id);
        pair
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiFailure {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, message)
    }

    fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "article not found")
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = json!({ "error": { "code": self.code, "message": self.message } });
        (self.status, Json(body)).into_response()
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, ApiFailure> {
    let token = bearer(headers).ok_or_else(|| ApiFailure::unauthorized("MISSING_TOKEN", "authentication required"))?;
    let tokens = state.tokens.read().await;
    tokens
        .access
        .get(token)
        .and_then(|id| state.user(*id))
        .cloned()
        .ok_or_else(|| ApiFailure::unauthorized("TOKEN_EXPIRED", "access token is invalid or expired"))
}

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<User, ApiFailure> {
    let user = authenticate(state, headers).await?;
    if user.role != "admin" {
        return Err(ApiFailure::new(StatusCode::FORBIDDEN, "FORBIDDEN", "admin role required"));
    }
    Ok(user)
}

/// Public routes accept anonymous callers but still reject a stale token.
async fn optional_auth(state: &AppState, headers: &HeaderMap) -> Result<(), ApiFailure> {
    if bearer(headers).is_some() {
        authenticate(state, headers).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn app() -> Router {
    let db: Db = Arc::new(AppState::seeded());
    let api = Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/articles", get(list_articles))
        .route("/articles/{id}", get(get_article))
        .route("/categories", get(list_categories))
        .route("/admin/articles", get(admin_list_articles).post(admin_create_article))
        .route(
            "/admin/articles/{id}",
            get(admin_get_article).put(admin_update_article).delete(admin_delete_article),
        );
    let control = Router::new()
        .route("/expire-access-tokens", post(expire_access_tokens))
        .route("/revoke-refresh-tokens", post(revoke_refresh_tokens))
        .route("/stats", get(stats));

    Router::new()
        .nest("/api", api)
        .nest("/__control", control)
        .layer(TraceLayer::new_for_http())
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn login(State(db): State<Db>, Json(input): Json<Credentials>) -> Result<Json<LoginResponse>, ApiFailure> {
    let account = db
        .accounts
        .iter()
        .find(|a| a.user.email == input.email && a.password == input.password)
        .ok_or_else(|| ApiFailure::unauthorized("INVALID_CREDENTIALS", "email or password is incorrect"))?;
    let pair = db.issue_tokens(account.user.id).await;
    db.stats.write().await.logins += 1;
    Ok(Json(LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user: account.user.clone(),
    }))
}

/// Rotates the pair: the presented refresh token is single-use.
async fn refresh(State(db): State<Db>, Json(input): Json<RefreshBody>) -> Result<Json<TokenResponse>, ApiFailure> {
    db.stats.write().await.refreshes += 1;
    let user_id = db.tokens.write().await.refresh.remove(&input.refresh_token);
    match user_id {
        Some(user_id) => Ok(Json(db.issue_tokens(user_id).await)),
        None => {
            db.stats.write().await.failed_refreshes += 1;
            Err(ApiFailure::unauthorized("INVALID_REFRESH_TOKEN", "refresh token is invalid or revoked"))
        }
    }
}

async fn logout(State(db): State<Db>, Json(input): Json<RefreshBody>) -> StatusCode {
    db.tokens.write().await.refresh.remove(&input.refresh_token);
    db.stats.write().await.logouts += 1;
    StatusCode::NO_CONTENT
}

async fn me(State(db): State<Db>, headers: HeaderMap) -> Result<Json<User>, ApiFailure> {
    authenticate(&db, &headers).await.map(Json)
}

// ---------------------------------------------------------------------------
// Public content
// ---------------------------------------------------------------------------

async fn list_articles(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Vec<Article>>, ApiFailure> {
    optional_auth(&db, &headers).await?;
    let articles = db.articles.read().await;
    Ok(Json(articles.values().filter(|a| a.published).cloned().collect()))
}

async fn get_article(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Article>, ApiFailure> {
    optional_auth(&db, &headers).await?;
    let articles = db.articles.read().await;
    articles
        .get(&id)
        .filter(|a| a.published)
        .cloned()
        .map(Json)
        .ok_or_else(ApiFailure::not_found)
}

async fn list_categories(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Vec<String>>, ApiFailure> {
    optional_auth(&db, &headers).await?;
    let articles = db.articles.read().await;
    let mut categories: Vec<String> = articles
        .values()
        .filter(|a| a.published)
        .map(|a| a.category.clone())
        .collect();
    categories.sort();
    categories.dedup();
    Ok(Json(categories))
}

// ---------------------------------------------------------------------------
// Admin CRUD
// ---------------------------------------------------------------------------

async fn admin_list_articles(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Vec<Article>>, ApiFailure> {
    require_admin(&db, &headers).await?;
    let articles = db.articles.read().await;
    Ok(Json(articles.values().cloned().collect()))
}

async fn admin_create_article(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateArticle>,
) -> Result<(StatusCode, Json<Article>), ApiFailure> {
    require_admin(&db, &headers).await?;
    let article = Article {
        id: Uuid::new_v4(),
        title: input.title,
        body: input.body,
        category: input.category,
        published: input.published,
    };
    db.articles.write().await.insert(article.id, article.clone());
    Ok((StatusCode::CREATED, Json(article)))
}

async fn admin_get_article(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Article>, ApiFailure> {
    require_admin(&db, &headers).await?;
    let articles = db.articles.read().await;
    articles.get(&id).cloned().map(Json).ok_or_else(ApiFailure::not_found)
}

async fn admin_update_article(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateArticle>,
) -> Result<Json<Article>, ApiFailure> {
    require_admin(&db, &headers).await?;
    let mut articles = db.articles.write().await;
    let article = articles.get_mut(&id).ok_or_else(ApiFailure::not_found)?;
    if let Some(title) = input.title {
        article.title = title;
    }
    if let Some(body) = input.body {
        article.body = body;
    }
    if let Some(category) = input.category {
        article.category = category;
    }
    if let Some(published) = input.published {
        article.published = published;
    }
    Ok(Json(article.clone()))
}

async fn admin_delete_article(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiFailure> {
    require_admin(&db, &headers).await?;
    let mut articles = db.articles.write().await;
    articles
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(ApiFailure::not_found)
}

// ---------------------------------------------------------------------------
// Test controls
// ---------------------------------------------------------------------------

async fn expire_access_tokens(State(db): State<Db>) -> StatusCode {
    db.tokens.write().await.access.clear();
    StatusCode::NO_CONTENT
}

async fn revoke_refresh_tokens(State(db): State<Db>) -> StatusCode {
    db.tokens.write().await.refresh.clear();
    StatusCode::NO_CONTENT
}

async fn stats(State(db): State<Db>) -> Json<Stats> {
    Json(db.stats.read().await.clone())
}
