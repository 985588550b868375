use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized{}", display_suffix(.0))]
    Unauthorized(Option<String>),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

fn display_suffix(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {}", m),
        None => String::new(),
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error bodies come in two shapes: the trading backend sends
/// `{"error": "message"}`, the identity provider sends
/// `{"error": {"code": 400, "message": "EMAIL_NOT_FOUND"}}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Message(String),
    Detailed { message: String },
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorField,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..end],
                body.len()
            )
        }
    }

    /// Pull the backend-provided message out of an error body, if there is one.
    pub fn backend_message(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        let message = match parsed.error {
            ErrorField::Message(m) => m,
            ErrorField::Detailed { message } => message,
        };
        if message.trim().is_empty() {
            None
        } else {
            Some(message)
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::backend_message(body).unwrap_or_else(|| Self::truncate_body(body));
        match status.as_u16() {
            400 => ApiError::BadRequest(message),
            401 => ApiError::Unauthorized(Self::backend_message(body)),
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    /// Message suitable for showing to the user.
    ///
    /// Rejections that carry a backend message surface it verbatim; transport
    /// failures and bare statuses fall back to `fallback`.
    pub fn display_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Unauthorized(Some(m))
            | ApiError::AccessDenied(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::BadRequest(m)
            | ApiError::ServerError(m)
                if !m.is_empty() && !m.contains("(truncated") && Self::looks_like_message(m) =>
            {
                m.clone()
            }
            _ => fallback.to_string(),
        }
    }

    /// Raw HTML or JSON bodies are not worth showing to a user.
    fn looks_like_message(text: &str) -> bool {
        let trimmed = text.trim_start();
        !(trimmed.starts_with('<') || trimmed.starts_with('{') || trimmed.starts_with('['))
    }

    /// True when the backend rejected the credential itself.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_) | ApiError::AccessDenied(_))
    }
}
