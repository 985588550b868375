//! Authentication module: the session store and what it is built from.
//!
//! This module provides:
//! - `SessionStore`: owns the current `Session`, persists the credential and
//!   runs login, register, logout and startup rehydration
//! - `IdentityBackend`: the seam to the identity service, with the
//!   `RestBackend` and `FirebaseBackend` adapters
//! - `CredentialStorage`: durable storage for the credential, backed by a
//!   JSON file, the OS keychain, or memory

pub mod backend;
pub mod error;
pub mod firebase;
pub mod rest;
pub mod session;
pub mod storage;
pub mod store;

pub use backend::{AuthGrant, IdentityBackend, RegisterRequest, DEFAULT_INITIAL_BALANCE};
pub use error::{AuthOperation, SessionError};
pub use firebase::FirebaseBackend;
pub use rest::RestBackend;
pub use session::{Session, SessionStatus};
pub use storage::{
    CredentialStorage, FileStorage, KeyringStorage, MemoryStorage, StorageError, TOKEN_KEY,
};
pub use store::SessionStore;
