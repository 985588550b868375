//! API client for the AlgoTrader REST backend.
//!
//! `ApiClient` owns the "default headers" of outgoing requests: a bearer
//! credential shared by every clone of the client. The session store attaches
//! and purges that credential; data requests simply pick it up.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{AuthGrant, RegisterRequest};
use crate::models::{Backtest, BacktestDetail, Strategy, StrategyUpdate, User};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default base URL of the trading backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api/";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) data requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterBody<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    initial_balance: f64,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(alias = "token")]
    access_token: String,
    user: User,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    user: User,
}

#[derive(Debug, Deserialize)]
struct StrategiesResponse {
    strategies: Vec<Strategy>,
}

#[derive(Debug, Deserialize)]
struct StrategyResponse {
    strategy: Strategy,
}

#[derive(Debug, Deserialize)]
struct BacktestsResponse {
    backtests: Vec<Backtest>,
}

/// API client for the trading backend.
/// Clone is cheap and clones share both the connection pool and the credential.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url`
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self::with_http_client(client, base_url))
    }

    /// Build around an existing `reqwest::Client`, sharing its connection pool.
    pub fn with_http_client(client: Client, base_url: &str) -> Self {
        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client,
            base_url,
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ===== Outgoing credential =====

    /// Attach the bearer credential to every subsequent request
    pub fn set_token(&self, token: &str) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    }

    /// Detach the bearer credential
    pub fn clear_token(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_token(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = self.token() {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidResponse("Credential is not a valid header value".to_string()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response, path: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e)))
    }

    /// Send a request once. Authentication calls go through here: they are
    /// never retried.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self
            .client
            .request(method.clone(), self.url(path))
            .headers(self.auth_headers()?);
        if let Some(body) = body {
            request = request.json(body);
        }
        debug!(method = %method, path = path, "Sending request");
        let response = request.send().await?;
        Self::check_response(response).await
    }

    /// Send a data request, backing off and retrying while rate limited.
    async fn send_with_retry<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            match self.send(method.clone(), path, body).await {
                Err(ApiError::RateLimited) => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(path = path, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
                other => return other,
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send_with_retry::<()>(Method::GET, path, None).await?;
        Self::parse(response, path).await
    }

    async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let response = self.send_with_retry(Method::PUT, path, Some(body)).await?;
        Self::parse(response, path).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let response = self.send_with_retry(Method::POST, path, Some(body)).await?;
        Self::parse(response, path).await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send_with_retry::<()>(Method::DELETE, path, None).await?;
        Ok(())
    }

    // ===== Authentication =====

    /// Exchange username and password for a credential
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthGrant, ApiError> {
        let path = "auth/login";
        let body = LoginBody { username, password };
        let response = self.send(Method::POST, path, Some(&body)).await?;
        let auth: AuthResponse = Self::parse(response, path).await?;
        Ok(AuthGrant {
            token: auth.access_token,
            user: auth.user,
        })
    }

    /// Create an account; the backend logs the new user in immediately
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthGrant, ApiError> {
        let path = "auth/register";
        let body = RegisterBody {
            username: &request.username,
            email: &request.email,
            password: &request.password,
            initial_balance: request.initial_balance,
        };
        let response = self.send(Method::POST, path, Some(&body)).await?;
        let auth: AuthResponse = Self::parse(response, path).await?;
        Ok(AuthGrant {
            token: auth.access_token,
            user: auth.user,
        })
    }

    /// Fetch the identity behind the attached credential
    pub async fn profile(&self) -> Result<User, ApiError> {
        let path = "auth/profile";
        let response = self.send::<()>(Method::GET, path, None).await?;
        let profile: ProfileResponse = Self::parse(response, path).await?;
        Ok(profile.user)
    }

    /// Tell the backend `token` is being discarded. The token is passed
    /// explicitly because the shared credential may already be detached.
    pub async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("auth/logout"))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    // ===== Strategies =====

    pub async fn list_strategies(&self) -> Result<Vec<Strategy>, ApiError> {
        let response: StrategiesResponse = self.get("strategy/").await?;
        Ok(response.strategies)
    }

    pub async fn get_strategy(&self, id: i64) -> Result<Strategy, ApiError> {
        let response: StrategyResponse = self.get(&format!("strategy/{}", id)).await?;
        Ok(response.strategy)
    }

    pub async fn create_strategy(&self, strategy: &StrategyUpdate) -> Result<Strategy, ApiError> {
        let response: StrategyResponse = self.post("strategy/", strategy).await?;
        Ok(response.strategy)
    }

    pub async fn update_strategy(&self, id: i64, strategy: &StrategyUpdate) -> Result<Strategy, ApiError> {
        let response: StrategyResponse = self.put(&format!("strategy/{}", id), strategy).await?;
        Ok(response.strategy)
    }

    pub async fn delete_strategy(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&format!("strategy/{}", id)).await
    }

    // ===== Backtests =====

    pub async fn list_backtests(&self) -> Result<Vec<Backtest>, ApiError> {
        let response: BacktestsResponse = self.get("backtest/").await?;
        Ok(response.backtests)
    }

    pub async fn get_backtest(&self, id: i64) -> Result<BacktestDetail, ApiError> {
        self.get(&format!("backtest/{}", id)).await
    }
}
