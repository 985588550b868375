//! Identity backend delegating to the hosted identity provider's REST API
//! (email/password accounts keyed by a project API key).
//!
//! The provider issues ID tokens; those become the session's bearer
//! credential and are what the trading backend verifies on protected routes.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::models::{User, UserId};

use super::{AuthGrant, IdentityBackend, RegisterRequest};

/// Base URL of the identity toolkit REST API
pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1/";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordBody<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

fn to_user(local_id: String, email: Option<String>, display_name: Option<String>) -> User {
    User {
        id: UserId::Text(local_id),
        username: display_name.unwrap_or_default(),
        email,
    }
}

pub struct FirebaseBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FirebaseBackend {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self::with_base_url(client, api_key, IDENTITY_TOOLKIT_URL)
    }

    pub fn with_base_url(client: Client, api_key: &str, base_url: &str) -> Self {
        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client,
            base_url,
            api_key: api_key.to_string(),
        }
    }

    /// Provider error codes arrive as `CODE` or `CODE : detail`.
    fn map_error(err: ApiError) -> ApiError {
        let code = match &err {
            ApiError::BadRequest(m) | ApiError::Unauthorized(Some(m)) => {
                m.split(" : ").next().unwrap_or_default().trim().to_string()
            }
            _ => String::new(),
        };
        match code.as_str() {
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
                ApiError::Unauthorized(Some("Invalid email or password".to_string()))
            }
            "USER_DISABLED" => ApiError::AccessDenied("This account has been disabled".to_string()),
            "EMAIL_EXISTS" => ApiError::Conflict("Email already registered".to_string()),
            "WEAK_PASSWORD" => ApiError::BadRequest(
                "Password must be at least 6 characters long".to_string(),
            ),
            "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" => ApiError::Unauthorized(None),
            "TOO_MANY_ATTEMPTS_TRY_LATER" => ApiError::RateLimited,
            _ => err,
        }
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}accounts:{}", self.base_url, endpoint);
        debug!(endpoint = endpoint, "Calling identity provider");
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(Self::map_error(ApiError::from_status(status, &text)))
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse {} response: {}", endpoint, e))
        })
    }

    async fn password_call(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> Result<SignInResponse, ApiError> {
        let body = PasswordBody {
            email,
            password,
            return_secure_token: true,
        };
        let response = self.call(endpoint, &body).await?;
        Self::parse(response, endpoint).await
    }
}

#[async_trait]
impl IdentityBackend for FirebaseBackend {
    fn name(&self) -> &'static str {
        "firebase"
    }

    /// `identifier` is the account email.
    async fn login(&self, identifier: &str, secret: &str) -> Result<AuthGrant, ApiError> {
        let signed_in = self
            .password_call("signInWithPassword", identifier, secret)
            .await?;
        Ok(AuthGrant {
            token: signed_in.id_token,
            user: to_user(signed_in.local_id, signed_in.email, signed_in.display_name),
        })
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthGrant, ApiError> {
        let signed_up = self
            .password_call("signUp", &request.email, &request.password)
            .await?;
        debug!(
            initial_balance = request.initial_balance,
            "Initial balance is not stored by the identity provider"
        );

        let mut display_name = signed_up.display_name;
        if !request.username.is_empty() {
            let body = json!({
                "idToken": signed_up.id_token,
                "displayName": request.username,
                "returnSecureToken": false,
            });
            // The account exists at this point; a missing display name is cosmetic.
            match self.call("update", &body).await {
                Ok(_) => display_name = Some(request.username.clone()),
                Err(e) => warn!(error = %e, "Failed to set display name"),
            }
        }

        Ok(AuthGrant {
            token: signed_up.id_token,
            user: to_user(signed_up.local_id, signed_up.email, display_name),
        })
    }

    async fn profile(&self, token: &str) -> Result<User, ApiError> {
        let response = self.call("lookup", &json!({ "idToken": token })).await?;
        let lookup: LookupResponse = Self::parse(response, "lookup").await?;
        let account = lookup
            .users
            .into_iter()
            .next()
            .ok_or(ApiError::Unauthorized(None))?;
        Ok(to_user(account.local_id, account.email, account.display_name))
    }
}
