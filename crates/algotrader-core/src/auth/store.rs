//! The session store: single source of truth for who is logged in.
//!
//! Lifecycle is `SessionStore::new` → `initialize()` → ready. The store is
//! owned by the application root and handed to whatever needs it; there is
//! no global instance.
//!
//! Invariant: a credential sits in storage (and on the API client) exactly
//! when the session is, or was last known to be, authenticated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::models::User;

use super::{
    AuthGrant, AuthOperation, CredentialStorage, IdentityBackend, RegisterRequest, Session,
    SessionError, TOKEN_KEY,
};

pub struct SessionStore {
    backend: Arc<dyn IdentityBackend>,
    storage: Arc<dyn CredentialStorage>,
    api: ApiClient,
    state: watch::Sender<Session>,
    /// Held for the duration of any mutating operation.
    in_flight: Mutex<()>,
    initialized: AtomicBool,
}

impl SessionStore {
    pub fn new(
        backend: Arc<dyn IdentityBackend>,
        storage: Arc<dyn CredentialStorage>,
        api: ApiClient,
    ) -> Self {
        let (state, _) = watch::channel(Session::loading());
        Self {
            backend,
            storage,
            api,
            state,
            in_flight: Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Client whose outgoing requests carry the session's credential.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver notified on every session change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Wait for rehydration to finish and return the resolved session.
    pub async fn wait_until_resolved(&self) -> Session {
        let mut rx = self.state.subscribe();
        let resolved = match rx.wait_for(Session::is_resolved).await {
            Ok(session) => session.clone(),
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.snapshot(),
        };
        resolved
    }

    fn begin(&self) -> Result<MutexGuard<'_, ()>, SessionError> {
        self.in_flight.try_lock().map_err(|_| {
            debug!("Rejecting overlapping session operation");
            SessionError::Busy
        })
    }

    // =========================================================================
    // Rehydration
    // =========================================================================

    /// Rebuild the session from the persisted credential. Runs once.
    ///
    /// Never surfaces backend or storage problems: a credential that cannot
    /// be read or is rejected is purged and the session resolves
    /// unauthenticated.
    ///
    /// Unlike the other operations this waits for an in-flight login or
    /// register instead of failing with `Busy`, so loading always ends. A
    /// session established by that call is kept as is.
    pub async fn initialize(&self) -> Result<(), SessionError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyInitialized);
        }
        let _flight = self.in_flight.lock().await;

        if self.state.borrow().authenticated {
            debug!("Session established before rehydration");
            self.state.send_modify(|session| session.loading = false);
            return Ok(());
        }

        let resolved = self.rehydrate().await;
        info!(status = ?resolved.status(), backend = self.backend.name(), "Session resolved");
        self.state.send_replace(resolved);
        Ok(())
    }

    async fn rehydrate(&self) -> Session {
        let token = match self.storage.get(TOKEN_KEY) {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(Some(_)) => {
                debug!("Persisted credential is empty");
                self.purge_credential();
                return Session::unauthenticated();
            }
            Ok(None) => {
                debug!("No persisted credential");
                return Session::unauthenticated();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persisted credential");
                self.purge_credential();
                return Session::unauthenticated();
            }
        };

        self.api.set_token(&token);
        match self.backend.profile(&token).await {
            Ok(user) => {
                debug!(user_id = %user.id, "Persisted credential accepted");
                Session::authenticated(user)
            }
            Err(e) => {
                info!(error = %e, "Persisted credential rejected, clearing it");
                self.purge_credential();
                Session::unauthenticated()
            }
        }
    }

    // =========================================================================
    // Login / register / logout
    // =========================================================================

    pub async fn login(&self, identifier: &str, secret: &str) -> Result<User, SessionError> {
        if identifier.trim().is_empty() || secret.is_empty() {
            return Err(SessionError::Validation(
                "Username and password are required".to_string(),
            ));
        }
        let _flight = self.begin()?;

        let grant = self
            .backend
            .login(identifier.trim(), secret)
            .await
            .map_err(|e| {
                warn!(error = %e, "Login failed");
                SessionError::api(AuthOperation::Login, e)
            })?;

        let user = self.establish(grant)?;
        info!(user_id = %user.id, "Login successful");
        Ok(user)
    }

    /// Create an account and, on success, treat it as a login.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, SessionError> {
        request.validate().map_err(SessionError::Validation)?;
        let _flight = self.begin()?;

        let grant = self.backend.register(request).await.map_err(|e| {
            warn!(error = %e, "Registration failed");
            SessionError::api(AuthOperation::Register, e)
        })?;

        let user = self.establish(grant)?;
        info!(user_id = %user.id, "Registration successful");
        Ok(user)
    }

    /// End the session. Local cleanup always happens; a failed backend
    /// notification is only logged. Logging out twice is a no-op.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let _flight = self.begin()?;

        let token = self.api.token().or_else(|| match self.storage.get(TOKEN_KEY) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted credential during logout");
                None
            }
        });
        let authenticated = self.state.borrow().authenticated;
        if token.is_none() && !authenticated {
            debug!("Logout with no active session");
            return Ok(());
        }

        self.purge_credential();
        self.state.send_modify(|session| {
            session.user = None;
            session.authenticated = false;
        });
        info!("Logged out");

        if let Some(token) = token {
            if let Err(e) = self.backend.logout(&token).await {
                warn!(error = %e, backend = self.backend.name(), "Logout notification failed");
            }
        }
        Ok(())
    }

    /// Persist first: if that fails nothing else changes.
    fn establish(&self, grant: AuthGrant) -> Result<User, SessionError> {
        self.storage.set(TOKEN_KEY, &grant.token).map_err(|e| {
            warn!(error = %e, "Failed to persist credential");
            SessionError::Storage(e)
        })?;
        self.api.set_token(&grant.token);

        let user = grant.user;
        self.state.send_modify(|session| {
            session.user = Some(user.clone());
            session.authenticated = true;
        });
        Ok(user)
    }

    fn purge_credential(&self) {
        self.api.clear_token();
        if let Err(e) = self.storage.remove(TOKEN_KEY) {
            warn!(error = %e, "Failed to remove persisted credential");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::auth::{MemoryStorage, RestBackend, SessionStatus, StorageError};
    use crate::models::UserId;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alice() -> User {
        User {
            id: UserId::Numeric(1),
            username: "alice".to_string(),
            email: None,
        }
    }

    /// Backend with canned answers that counts its calls.
    #[derive(Default)]
    struct StubBackend {
        accept_login: bool,
        accept_profile: bool,
        fail_logout: bool,
        calls: AtomicUsize,
        logouts: AtomicUsize,
        entered: Option<Arc<Notify>>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl IdentityBackend for StubBackend {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn login(&self, identifier: &str, _secret: &str) -> Result<AuthGrant, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let (Some(entered), Some(gate)) = (&self.entered, &self.gate) {
                entered.notify_one();
                gate.notified().await;
            }
            if self.accept_login {
                Ok(AuthGrant {
                    token: format!("token-{}", identifier),
                    user: alice(),
                })
            } else {
                Err(ApiError::Unauthorized(Some("Invalid username or password".to_string())))
            }
        }

        async fn register(&self, _request: &RegisterRequest) -> Result<AuthGrant, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AuthGrant {
                token: "registered".to_string(),
                user: alice(),
            })
        }

        async fn profile(&self, _token: &str) -> Result<User, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.accept_profile {
                Ok(alice())
            } else {
                Err(ApiError::Unauthorized(None))
            }
        }

        async fn logout(&self, _token: &str) -> Result<(), ApiError> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            if self.fail_logout {
                Err(ApiError::ServerError("down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Storage whose writes always fail.
    struct ReadOnlyStorage;

    impl CredentialStorage for ReadOnlyStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn store_with(backend: Arc<StubBackend>, storage: Arc<MemoryStorage>) -> SessionStore {
        let api = ApiClient::new("http://127.0.0.1:9/").unwrap();
        SessionStore::new(backend, storage, api)
    }

    fn stored_token(storage: &MemoryStorage) -> Option<String> {
        storage.get(TOKEN_KEY).unwrap()
    }

    // -------------------------------------------------------------------------
    // initialize
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_initialize_without_credential() {
        let backend = Arc::new(StubBackend::default());
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(backend.clone(), storage.clone());
        assert_eq!(store.snapshot().status(), SessionStatus::Loading);

        store.initialize().await.unwrap();

        let session = store.snapshot();
        assert!(!session.loading);
        assert!(!session.authenticated);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(!store.api().has_token());
    }

    #[tokio::test]
    async fn test_initialize_with_accepted_credential() {
        let backend = Arc::new(StubBackend {
            accept_profile: true,
            ..Default::default()
        });
        let storage = Arc::new(MemoryStorage::with_token("abc"));
        let store = store_with(backend, storage.clone());

        store.initialize().await.unwrap();

        let session = store.snapshot();
        assert_eq!(session.status(), SessionStatus::Authenticated);
        assert_eq!(session.username(), Some("alice"));
        assert_eq!(store.api().token().as_deref(), Some("abc"));
        assert_eq!(stored_token(&storage).as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_initialize_with_rejected_credential() {
        let backend = Arc::new(StubBackend::default());
        let storage = Arc::new(MemoryStorage::with_token("stale"));
        let store = store_with(backend, storage.clone());

        store.initialize().await.unwrap();

        let session = store.snapshot();
        assert_eq!(session.status(), SessionStatus::Unauthenticated);
        assert_eq!(stored_token(&storage), None);
        assert!(!store.api().has_token());
    }

    #[tokio::test]
    async fn test_initialize_with_empty_credential() {
        let backend = Arc::new(StubBackend::default());
        let storage = Arc::new(MemoryStorage::with_token(""));
        let store = store_with(backend.clone(), storage.clone());

        store.initialize().await.unwrap();

        assert_eq!(store.snapshot().status(), SessionStatus::Unauthenticated);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_runs_once() {
        let backend = Arc::new(StubBackend::default());
        let store = store_with(backend, Arc::new(MemoryStorage::new()));
        store.initialize().await.unwrap();
        assert!(matches!(
            store.initialize().await,
            Err(SessionError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn test_wait_until_resolved() {
        let backend = Arc::new(StubBackend {
            accept_profile: true,
            ..Default::default()
        });
        let store = Arc::new(store_with(backend, Arc::new(MemoryStorage::with_token("abc"))));
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.wait_until_resolved().await })
        };
        store.initialize().await.unwrap();
        let session = waiter.await.unwrap();
        assert_eq!(session.status(), SessionStatus::Authenticated);
    }

    // -------------------------------------------------------------------------
    // login / register / logout
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_then_logout_leaves_no_credential() {
        let backend = Arc::new(StubBackend {
            accept_login: true,
            ..Default::default()
        });
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(backend.clone(), storage.clone());
        store.initialize().await.unwrap();

        let changes = store.subscribe();
        let user = store.login("alice", "secret123").await.unwrap();
        assert_eq!(user.username, "alice");
        assert!(changes.has_changed().unwrap());
        assert_eq!(stored_token(&storage).as_deref(), Some("token-alice"));
        assert_eq!(store.api().token().as_deref(), Some("token-alice"));

        store.logout().await.unwrap();
        let session = store.snapshot();
        assert_eq!(session.status(), SessionStatus::Unauthenticated);
        assert_eq!(session.user, None);
        assert!(storage.is_empty());
        assert!(!store.api().has_token());
        assert_eq!(backend.logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_login_leaves_state_unchanged() {
        let backend = Arc::new(StubBackend::default());
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(backend, storage.clone());
        store.initialize().await.unwrap();
        let before = store.snapshot();

        let err = store.login("alice", "wrong").await.unwrap_err();
        assert_eq!(err.display_message(), "Invalid username or password");
        assert_eq!(store.snapshot(), before);
        assert!(storage.is_empty());
        assert!(!store.api().has_token());
    }

    #[tokio::test]
    async fn test_login_requires_fields() {
        let backend = Arc::new(StubBackend::default());
        let store = store_with(backend.clone(), Arc::new(MemoryStorage::new()));
        let err = store.login("  ", "secret").await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_register_mismatch_rejected_before_network() {
        let backend = Arc::new(StubBackend::default());
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(backend.clone(), storage.clone());
        store.initialize().await.unwrap();

        let request = RegisterRequest::new("alice", "alice@example.com", "secret123", "secret321");
        let err = store.register(&request).await.unwrap_err();
        assert_eq!(err.display_message(), "Passwords do not match");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_register_logs_in() {
        let backend = Arc::new(StubBackend::default());
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(backend, storage.clone());
        store.initialize().await.unwrap();

        let request = RegisterRequest::new("alice", "alice@example.com", "secret123", "secret123");
        store.register(&request).await.unwrap();
        assert_eq!(store.snapshot().status(), SessionStatus::Authenticated);
        assert_eq!(stored_token(&storage).as_deref(), Some("registered"));
    }

    #[tokio::test]
    async fn test_logout_without_session_is_noop() {
        let backend = Arc::new(StubBackend::default());
        let storage = Arc::new(MemoryStorage::new());
        storage.set("theme", "dark").unwrap();
        let store = store_with(backend.clone(), storage.clone());
        store.initialize().await.unwrap();

        store.logout().await.unwrap();
        store.logout().await.unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(backend.logouts.load(Ordering::SeqCst), 0);
        assert_eq!(store.snapshot().status(), SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_logout_notification_failure_still_cleans_up() {
        let backend = Arc::new(StubBackend {
            accept_login: true,
            fail_logout: true,
            ..Default::default()
        });
        let storage = Arc::new(MemoryStorage::new());
        let store = store_with(backend.clone(), storage.clone());
        store.initialize().await.unwrap();
        store.login("alice", "secret123").await.unwrap();

        store.logout().await.unwrap();
        assert_eq!(backend.logouts.load(Ordering::SeqCst), 1);
        assert!(storage.is_empty());
        assert!(!store.snapshot().authenticated);
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_login() {
        let backend = Arc::new(StubBackend {
            accept_login: true,
            ..Default::default()
        });
        let api = ApiClient::new("http://127.0.0.1:9/").unwrap();
        let store = SessionStore::new(backend, Arc::new(ReadOnlyStorage), api);
        store.initialize().await.unwrap();

        let err = store.login("alice", "secret123").await.unwrap_err();
        assert!(matches!(err, SessionError::Storage(_)));
        assert!(!store.snapshot().authenticated);
        assert!(!store.api().has_token());
    }

    #[tokio::test]
    async fn test_overlapping_operations_are_rejected() {
        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(StubBackend {
            accept_login: true,
            entered: Some(Arc::clone(&entered)),
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        });
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(store_with(backend, storage.clone()));
        store.initialize().await.unwrap();

        let pending = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.login("alice", "secret123").await })
        };
        entered.notified().await;

        assert!(matches!(store.logout().await, Err(SessionError::Busy)));
        assert!(matches!(
            store.login("bob", "secret123").await,
            Err(SessionError::Busy)
        ));

        gate.notify_one();
        pending.await.unwrap().unwrap();
        assert_eq!(stored_token(&storage).as_deref(), Some("token-alice"));

        // Guard released once the first call completes
        store.logout().await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_waits_for_login_in_flight() {
        let entered = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(StubBackend {
            accept_login: true,
            entered: Some(Arc::clone(&entered)),
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        });
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(store_with(backend.clone(), storage.clone()));

        let login = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.login("alice", "secret123").await })
        };
        entered.notified().await;

        let init = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.initialize().await })
        };
        tokio::task::yield_now().await;
        assert!(store.snapshot().loading);

        gate.notify_one();
        login.await.unwrap().unwrap();
        init.await.unwrap().unwrap();

        let session = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            store.wait_until_resolved(),
        )
        .await
        .unwrap();
        assert!(!session.loading);
        assert_eq!(session.status(), SessionStatus::Authenticated);
        assert_eq!(session.username(), Some("alice"));
        assert_eq!(stored_token(&storage).as_deref(), Some("token-alice"));
        // Only the login reached the backend; no profile check discarded it
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    // -------------------------------------------------------------------------
    // Against the REST backend
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_rest_login_scenario() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"username": "alice", "password": "secret123"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "abc",
                "user": {"id": 1, "username": "alice"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/strategy/"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"strategies": []})))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri()).unwrap();
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(
            Arc::new(RestBackend::new(api.clone())),
            storage.clone(),
            api,
        );
        store.initialize().await.unwrap();

        store.login("alice", "secret123").await.unwrap();
        let session = store.snapshot();
        assert!(session.authenticated);
        assert_eq!(session.username(), Some("alice"));
        assert_eq!(stored_token(&storage).as_deref(), Some("abc"));

        // Data requests pick up the credential
        let strategies = store.api().list_strategies().await.unwrap();
        assert!(strategies.is_empty());
    }

    #[tokio::test]
    async fn test_rest_rehydration_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/profile"))
            .and(header("authorization", "Bearer expired"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"msg": "Token has expired"})))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri()).unwrap();
        let storage = Arc::new(MemoryStorage::with_token("expired"));
        let store = SessionStore::new(Arc::new(RestBackend::new(api.clone())), storage.clone(), api);

        store.initialize().await.unwrap();
        assert_eq!(store.snapshot().status(), SessionStatus::Unauthenticated);
        assert!(storage.is_empty());
    }
}
