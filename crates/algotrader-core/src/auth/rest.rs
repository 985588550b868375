//! Identity backend built on the trading backend's own `auth/*` endpoints.

use async_trait::async_trait;
use tracing::debug;

use crate::api::{ApiClient, ApiError};
use crate::models::User;

use super::{AuthGrant, IdentityBackend, RegisterRequest};

pub struct RestBackend {
    api: ApiClient,
    notify_logout: bool,
}

impl RestBackend {
    /// `api` should be the same client (or a clone of it) the session store
    /// attaches credentials to, so profile lookups carry the bearer header.
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            notify_logout: false,
        }
    }

    /// Also call `POST auth/logout` when the session ends.
    pub fn with_logout_notification(mut self, notify: bool) -> Self {
        self.notify_logout = notify;
        self
    }
}

#[async_trait]
impl IdentityBackend for RestBackend {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn login(&self, identifier: &str, secret: &str) -> Result<AuthGrant, ApiError> {
        self.api.login(identifier, secret).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthGrant, ApiError> {
        self.api.register(request).await
    }

    async fn profile(&self, _token: &str) -> Result<User, ApiError> {
        self.api.profile().await
    }

    async fn logout(&self, token: &str) -> Result<(), ApiError> {
        if !self.notify_logout {
            return Ok(());
        }
        debug!("Notifying backend of logout");
        self.api.logout(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_register_sends_initial_balance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/register"))
            .and(body_json(json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "secret123",
                "initial_balance": 25000.0
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "message": "User registered successfully",
                "access_token": "tok",
                "user": {"id": 5, "username": "alice", "email": "alice@example.com"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = RestBackend::new(ApiClient::new(&server.uri()).unwrap());
        let request = RegisterRequest::new("alice", "alice@example.com", "secret123", "secret123")
            .with_initial_balance(25_000.0);
        let grant = backend.register(&request).await.unwrap();
        assert_eq!(grant.token, "tok");
        assert_eq!(grant.user.id, crate::models::UserId::Numeric(5));
    }

    #[tokio::test]
    async fn test_profile_uses_attached_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/profile"))
            .and(header("authorization", "Bearer stored"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": {"id": 1, "username": "alice"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri()).unwrap();
        let backend = RestBackend::new(api.clone());
        api.set_token("stored");
        let user = backend.profile("stored").await.unwrap();
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn test_logout_is_local_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let backend = RestBackend::new(ApiClient::new(&server.uri()).unwrap());
        backend.logout("tok").await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_notification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let backend =
            RestBackend::new(ApiClient::new(&server.uri()).unwrap()).with_logout_notification(true);
        assert!(backend.logout("tok").await.is_err());
    }
}
