use crate::auth::Session;

use super::{Access, Route, RouteGuard};

/// What the front end should show after a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Render(Route),
    /// Protected view requested while the session is still loading.
    Placeholder(Route),
    Redirect { from: Route, to: Route },
    NotFound,
}

/// Resolves navigations, applying the guard to protected views only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Navigator {
    guard: RouteGuard,
}

impl Navigator {
    pub fn new(guard: RouteGuard) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    pub fn navigate(&self, route: Route, session: &Session) -> Navigation {
        if !route.is_protected() {
            return Navigation::Render(route);
        }
        match self.guard.check(session) {
            Access::Pending => Navigation::Placeholder(route),
            Access::Granted => Navigation::Render(route),
            Access::Redirect(to) => Navigation::Redirect { from: route, to },
        }
    }

    pub fn navigate_path(&self, path: &str, session: &Session) -> Navigation {
        match Route::parse(path) {
            Some(route) => self.navigate(route, session),
            None => Navigation::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{User, UserId};

    fn signed_in() -> Session {
        Session::authenticated(User {
            id: UserId::Numeric(1),
            username: "alice".to_string(),
            email: None,
        })
    }

    #[test]
    fn test_public_routes_always_render() {
        let navigator = Navigator::default();
        for session in [Session::loading(), Session::unauthenticated(), signed_in()] {
            assert_eq!(
                navigator.navigate(Route::Login, &session),
                Navigation::Render(Route::Login)
            );
            assert_eq!(
                navigator.navigate_path("/register", &session),
                Navigation::Render(Route::Register)
            );
        }
    }

    #[test]
    fn test_protected_route_outcomes() {
        let navigator = Navigator::default();
        let route = Route::StrategyDetail(3);
        assert_eq!(
            navigator.navigate(route, &Session::loading()),
            Navigation::Placeholder(route)
        );
        assert_eq!(
            navigator.navigate(route, &Session::unauthenticated()),
            Navigation::Redirect {
                from: route,
                to: Route::Login
            }
        );
        assert_eq!(navigator.navigate(route, &signed_in()), Navigation::Render(route));
    }

    #[test]
    fn test_unknown_path() {
        let navigator = Navigator::default();
        assert_eq!(
            navigator.navigate_path("/nope", &signed_in()),
            Navigation::NotFound
        );
    }
}
