//! Application views and their paths.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Register,
    Dashboard,
    Portfolio,
    Strategies,
    StrategyDetail(i64),
    Backtests,
    BacktestDetail(i64),
    Market,
}

impl Route {
    /// Parse a path such as `/strategies/7`. Trailing slashes and a query
    /// string are ignored; unknown paths yield `None`.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] => Some(Route::Dashboard),
            ["login"] => Some(Route::Login),
            ["register"] => Some(Route::Register),
            ["portfolio"] => Some(Route::Portfolio),
            ["strategies"] => Some(Route::Strategies),
            ["strategies", id] => id.parse().ok().map(Route::StrategyDetail),
            ["backtests"] => Some(Route::Backtests),
            ["backtests", id] => id.parse().ok().map(Route::BacktestDetail),
            ["market"] => Some(Route::Market),
            _ => None,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::Register => "/register".to_string(),
            Route::Dashboard => "/".to_string(),
            Route::Portfolio => "/portfolio".to_string(),
            Route::Strategies => "/strategies".to_string(),
            Route::StrategyDetail(id) => format!("/strategies/{}", id),
            Route::Backtests => "/backtests".to_string(),
            Route::BacktestDetail(id) => format!("/backtests/{}", id),
            Route::Market => "/market".to_string(),
        }
    }

    /// Everything except the sign-in and sign-up views needs a session.
    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::Login | Route::Register)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Login => "Sign in",
            Route::Register => "Create account",
            Route::Dashboard => "Dashboard",
            Route::Portfolio => "Portfolio",
            Route::Strategies | Route::StrategyDetail(_) => "Strategies",
            Route::Backtests | Route::BacktestDetail(_) => "Backtests",
            Route::Market => "Market",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_static_routes() {
        assert_eq!(Route::parse("/"), Some(Route::Dashboard));
        assert_eq!(Route::parse(""), Some(Route::Dashboard));
        assert_eq!(Route::parse("/login"), Some(Route::Login));
        assert_eq!(Route::parse("/register/"), Some(Route::Register));
        assert_eq!(Route::parse("/market?symbol=SPY"), Some(Route::Market));
    }

    #[test]
    fn test_parse_detail_routes() {
        assert_eq!(Route::parse("/strategies/7"), Some(Route::StrategyDetail(7)));
        assert_eq!(Route::parse("/backtests/12"), Some(Route::BacktestDetail(12)));
        assert_eq!(Route::parse("/strategies/abc"), None);
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(Route::parse("/settings"), None);
        assert_eq!(Route::parse("/strategies/1/edit"), None);
    }

    #[test]
    fn test_path_roundtrip_for_every_view() {
        let routes = [
            Route::Login,
            Route::Register,
            Route::Dashboard,
            Route::Portfolio,
            Route::Strategies,
            Route::StrategyDetail(3),
            Route::Backtests,
            Route::BacktestDetail(4),
            Route::Market,
        ];
        for route in routes {
            assert_eq!(Route::parse(&route.path()), Some(route));
        }
    }

    #[test]
    fn test_protection() {
        assert!(!Route::Login.is_protected());
        assert!(!Route::Register.is_protected());
        assert!(Route::Dashboard.is_protected());
        assert!(Route::BacktestDetail(1).is_protected());
    }
}
