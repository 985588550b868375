//! Identity record returned by the identity backends.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque user identifier.
///
/// The trading backend issues integer ids while the hosted identity provider
/// issues string uids; neither is interpreted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Numeric(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Numeric(id) => write!(f, "{}", id),
            UserId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId::Numeric(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId::Text(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl User {
    /// Name to greet the user with: the username, or the email when the
    /// provider never set one.
    pub fn display_name(&self) -> &str {
        if !self.username.is_empty() {
            &self.username
        } else {
            self.email.as_deref().unwrap_or("")
        }
    }
}
