//! Public-endpoint classification.
//!
//! A request is public when its path contains one of the allowlisted
//! substrings. Anything under `/admin/` is never public, whatever else it
//! matches.

pub const DEFAULT_PUBLIC_ENDPOINTS: &[&str] = &[
    "/articles",
    "/categories",
    "/tags",
    "/pages",
    "/banners",
    "/search",
    "/healthz",
];

const ADMIN_SEGMENT: &str = "/admin/";

/// Ordered allowlist of path substrings that may be called without a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicEndpoints {
    patterns: Vec<String>,
}

impl PublicEndpoints {
    pub fn new<I, P>(patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Query string and fragment are ignored, so `?next=/admin/` cannot
    /// change the answer either way.
    pub fn is_public(&self, path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        if path.contains(ADMIN_SEGMENT) {
            return false;
        }
        self.patterns.iter().any(|p| path.contains(p.as_str()))
    }
}

impl Default for PublicEndpoints {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_ENDPOINTS.iter().copied())
    }
}
