//! Login redirect capability.
//!
//! The client never navigates on its own; it asks the injected `Navigator`
//! to send the user to the login route when the session cannot be recovered.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self, login_route: &str);
}

impl<N: Navigator + ?Sized> Navigator for Arc<N> {
    fn redirect_to_login(&self, login_route: &str) {
        (**self).redirect_to_login(login_route)
    }
}

/// Only logs the redirect. For headless hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn redirect_to_login(&self, login_route: &str) {
        info!(%login_route, "login redirect requested");
    }
}

/// Adapts a closure into a `Navigator`.
pub struct FnNavigator<F>(pub F);

impl<F> Navigator for FnNavigator<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn redirect_to_login(&self, login_route: &str) {
        (self.0)(login_route)
    }
}

/// Records every redirect so a host (or a test) can poll for them.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self) -> usize {
        self.redirects.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to_login(&self, login_route: &str) {
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(login_route.to_string());
    }
}
