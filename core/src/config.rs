//! Client configuration.
//!
//! Built once at startup, either explicitly or from environment variables:
//!
//! - `CMS_API_BASE_URL`: API root (default `http://localhost:3000/api`)
//! - `CMS_LOGIN_ROUTE`: where the user is sent when the session is lost
//!   (default `/login`)
//! - `CMS_HTTP_TIMEOUT_SECS`: optional global request timeout
//! - `CMS_PUBLIC_ENDPOINTS`: optional comma-separated allowlist override

use std::time::Duration;

use thiserror::Error;

use crate::policy::PublicEndpoints;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a whole number of seconds, got {value:?}")]
    InvalidTimeout { var: &'static str, value: String },

    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub login_path: String,
    pub refresh_path: String,
    pub logout_path: String,
    pub login_route: String,
    pub public_endpoints: PublicEndpoints,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            login_path: "/auth/login".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            logout_path: "/auth/logout".to_string(),
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            public_endpoints: PublicEndpoints::default(),
            timeout: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env` with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("CMS_API_BASE_URL") {
            Some(url) if url.trim().is_empty() => {
                return Err(ConfigError::Empty { var: "CMS_API_BASE_URL" });
            }
            Some(url) => Self::new(url.trim()),
            None => Self::default(),
        };

        if let Some(route) = lookup("CMS_LOGIN_ROUTE") {
            if route.trim().is_empty() {
                return Err(ConfigError::Empty { var: "CMS_LOGIN_ROUTE" });
            }
            config.login_route = route.trim().to_string();
        }

        if let Some(raw) = lookup("CMS_HTTP_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidTimeout {
                var: "CMS_HTTP_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }

        if let Some(raw) = lookup("CMS_PUBLIC_ENDPOINTS") {
            config.public_endpoints = PublicEndpoints::new(raw.split(',').map(str::trim));
        }

        Ok(config)
    }

    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    pub fn with_public_endpoints(mut self, endpoints: PublicEndpoints) -> Self {
        self.public_endpoints = endpoints;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Absolute URLs pass through; anything else is joined onto `base_url`.
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
