//! Route guard: gates protected views behind a resolved session.
//!
//! The guard holds no state of its own. Every call re-reads the session it
//! is handed, so callers re-run it on each navigation and on each session
//! change.

use tokio::sync::watch;

use crate::auth::{Session, SessionStatus};

use super::Route;

/// Outcome of checking a session against a protected view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Still rehydrating: show a placeholder, neither content nor redirect.
    Pending,
    Granted,
    Redirect(Route),
}

/// A guarded render. `Content` is only ever produced for `Access::Granted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    Placeholder,
    Content(T),
    Redirect(Route),
}

impl<T> Guarded<T> {
    pub fn content(self) -> Option<T> {
        match self {
            Guarded::Content(content) => Some(content),
            _ => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Guarded::Placeholder)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RouteGuard {
    login: Route,
}

impl RouteGuard {
    pub fn new() -> Self {
        Self { login: Route::Login }
    }

    pub fn login_route(&self) -> Route {
        self.login
    }

    pub fn check(&self, session: &Session) -> Access {
        match session.status() {
            SessionStatus::Loading => Access::Pending,
            SessionStatus::Authenticated => Access::Granted,
            SessionStatus::Unauthenticated => Access::Redirect(self.login),
        }
    }

    /// Produce the protected content only when access is granted; the
    /// closure is not called otherwise.
    pub fn render<T, F>(&self, session: &Session, content: F) -> Guarded<T>
    where
        F: FnOnce() -> T,
    {
        match self.check(session) {
            Access::Pending => Guarded::Placeholder,
            Access::Granted => Guarded::Content(content()),
            Access::Redirect(route) => Guarded::Redirect(route),
        }
    }

    /// Wait for the next session change and re-check it. Returns `None` once
    /// the session store is gone.
    pub async fn next_access(&self, changes: &mut watch::Receiver<Session>) -> Option<Access> {
        changes.changed().await.ok()?;
        let access = self.check(&changes.borrow_and_update());
        Some(access)
    }
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new()
    }
}
