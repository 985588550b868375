//! Application root: builds the session store from configuration and owns
//! the navigator that front ends route through.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::api::ApiClient;
use crate::auth::{
    CredentialStorage, FileStorage, FirebaseBackend, IdentityBackend, KeyringStorage,
    RestBackend, Session, SessionStore,
};
use crate::config::{Config, IdentityConfig, StorageKind};
use crate::routing::{Navigation, Navigator, Route};

pub struct App {
    pub config: Config,
    store: Arc<SessionStore>,
    navigator: Navigator,
}

impl App {
    /// Load configuration (file plus environment) and wire up the store.
    pub fn new() -> Result<Self> {
        let mut config = Config::load()?;
        config.apply_env();
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        reqwest::Url::parse(&config.api_base_url)
            .with_context(|| format!("Invalid API base URL {}", config.api_base_url))?;
        let api = ApiClient::new(&config.api_base_url)?;
        let backend = build_backend(&config, &api);
        let storage = build_storage(&config)?;
        info!(
            backend = backend.name(),
            api = %api.base_url(),
            "Session store configured"
        );
        Ok(Self::with_store(
            config,
            Arc::new(SessionStore::new(backend, storage, api)),
        ))
    }

    pub fn with_store(config: Config, store: Arc<SessionStore>) -> Self {
        Self {
            config,
            store,
            navigator: Navigator::default(),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn api(&self) -> &ApiClient {
        self.store.api()
    }

    /// Rehydrate the session and wait until it is resolved.
    pub async fn start(&self) -> Result<Session> {
        self.store.initialize().await?;
        Ok(self.store.wait_until_resolved().await)
    }

    pub fn open(&self, route: Route) -> Navigation {
        self.navigator.navigate(route, &self.store.snapshot())
    }

    pub fn open_path(&self, path: &str) -> Navigation {
        self.navigator.navigate_path(path, &self.store.snapshot())
    }

    /// Remember the username for the next sign-in prompt.
    pub fn remember_username(&mut self, username: &str) -> Result<()> {
        if self.config.last_username.as_deref() == Some(username) {
            return Ok(());
        }
        self.config.last_username = Some(username.to_string());
        self.config.save()
    }
}

fn build_backend(config: &Config, api: &ApiClient) -> Arc<dyn IdentityBackend> {
    match &config.identity {
        IdentityConfig::Rest => Arc::new(
            RestBackend::new(api.clone()).with_logout_notification(config.notify_logout),
        ),
        IdentityConfig::Firebase { api_key } => {
            Arc::new(FirebaseBackend::new(api.http().clone(), api_key))
        }
    }
}

fn build_storage(config: &Config) -> Result<Arc<dyn CredentialStorage>> {
    Ok(match config.storage {
        StorageKind::File => Arc::new(FileStorage::new(config.credentials_path()?)),
        StorageKind::Keyring => Arc::new(KeyringStorage::new()),
    })
}
