use std::fmt;

use thiserror::Error;

use crate::api::ApiError;

use super::StorageError;

/// Session operations that reach the identity backend and can fail there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOperation {
    Login,
    Register,
}

impl AuthOperation {
    /// Shown when the backend gives no message of its own.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            AuthOperation::Login => "Login failed. Please check your credentials and try again.",
            AuthOperation::Register => "Registration failed. Please try again.",
        }
    }
}

impl fmt::Display for AuthOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthOperation::Login => "Login",
            AuthOperation::Register => "Registration",
        })
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    /// Rejected locally, before any request was sent.
    #[error("{0}")]
    Validation(String),

    #[error("Another session operation is already in progress")]
    Busy,

    #[error("Session store has already been initialized")]
    AlreadyInitialized,

    #[error("{operation} failed: {source}")]
    Api {
        operation: AuthOperation,
        #[source]
        source: ApiError,
    },

    #[error("Failed to persist credential: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    pub fn api(operation: AuthOperation, source: ApiError) -> Self {
        SessionError::Api { operation, source }
    }

    /// Message suitable for showing next to the form that triggered the call.
    pub fn display_message(&self) -> String {
        match self {
            SessionError::Validation(message) => message.clone(),
            SessionError::Busy => "Please wait for the current request to finish".to_string(),
            SessionError::AlreadyInitialized => self.to_string(),
            SessionError::Api { operation, source } => {
                if matches!(source, ApiError::Network(_)) {
                    "Unable to connect to server. Check your internet connection.".to_string()
                } else {
                    source.display_message(operation.fallback_message())
                }
            }
            SessionError::Storage(_) => "Could not save your session on this device".to_string(),
        }
    }
}
