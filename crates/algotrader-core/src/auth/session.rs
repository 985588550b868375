use serde::{Deserialize, Serialize};

use crate::models::User;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Rehydration from the persisted credential has not finished.
    Loading,
    Authenticated,
    Unauthenticated,
}

/// Current user's authentication state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: Option<User>,
    pub authenticated: bool,
    pub loading: bool,
}

impl Session {
    /// Fresh session, waiting on rehydration.
    pub fn loading() -> Self {
        Self {
            user: None,
            authenticated: false,
            loading: true,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            user: None,
            authenticated: false,
            loading: false,
        }
    }

    pub fn authenticated(user: User) -> Self {
        Self {
            user: Some(user),
            authenticated: true,
            loading: false,
        }
    }

    /// Loading wins over the authenticated flag.
    pub fn status(&self) -> SessionStatus {
        if self.loading {
            SessionStatus::Loading
        } else if self.authenticated {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Unauthenticated
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.loading
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.username.as_str())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::loading()
    }
}
