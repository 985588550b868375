//! The identity backend seam.
//!
//! The session store talks to whichever backend it was constructed with.
//! `RestBackend` uses the trading backend's own `auth/*` endpoints;
//! `FirebaseBackend` delegates to a hosted identity provider.

use async_trait::async_trait;

use crate::api::ApiError;
use crate::models::User;

/// Initial paper-trading balance offered on registration.
pub const DEFAULT_INITIAL_BALANCE: f64 = 10_000.0;

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Credential plus identity, returned by a successful login or registration.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthGrant {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub initial_balance: f64,
}

impl RegisterRequest {
    pub fn new(username: &str, email: &str, password: &str, confirm_password: &str) -> Self {
        Self {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: confirm_password.to_string(),
            initial_balance: DEFAULT_INITIAL_BALANCE,
        }
    }

    pub fn with_initial_balance(mut self, initial_balance: f64) -> Self {
        self.initial_balance = initial_balance;
        self
    }

    /// Client-side checks, run before anything is sent.
    pub fn validate(&self) -> Result<(), String> {
        if self.password != self.confirm_password {
            return Err("Passwords do not match".to_string());
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LENGTH
            ));
        }
        if !self.initial_balance.is_finite() || self.initial_balance <= 0.0 {
            return Err("Initial balance must be a positive amount".to_string());
        }
        Ok(())
    }
}

#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn login(&self, identifier: &str, secret: &str) -> Result<AuthGrant, ApiError>;

    async fn register(&self, request: &RegisterRequest) -> Result<AuthGrant, ApiError>;

    /// Resolve a persisted credential back into an identity.
    ///
    /// The session store has already attached `token` to outgoing requests
    /// when this runs; backends that read it from the request body use the
    /// argument instead.
    async fn profile(&self, token: &str) -> Result<User, ApiError>;

    /// Notify the backend that `token` is being discarded. Local-only
    /// backends keep the default.
    async fn logout(&self, _token: &str) -> Result<(), ApiError> {
        Ok(())
    }
}
