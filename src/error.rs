//! Errors surfaced by the client.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Failure of the transport layer itself: no HTTP status was received.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    #[error("invalid response body: {0}")]
    Body(String),
}

/// Why a session could not be renewed. Cloned to every queued request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("no refresh token available")]
    MissingRefreshToken,
    #[error("refresh rejected by server ({status})")]
    Rejected { status: u16, message: Option<String> },
    #[error("refresh response did not contain an access token")]
    InvalidResponse,
    #[error("refresh request failed: {0}")]
    Transport(String),
    #[error("refresh request timed out")]
    TimedOut,
    #[error("refresh was abandoned before it completed")]
    Abandoned,
    #[error("renewed tokens could not be stored: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("secure storage is unavailable: {0}")]
    Unavailable(String),
    #[error("stored value is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base url `{value}`: {reason}")]
    BaseUrl { value: String, reason: String },
    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },
    #[error("failed to build http client: {0}")]
    HttpClient(String),
    #[error("invalid json config")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The session could not be renewed; the user has to sign in again.
    #[error("session expired: {0}")]
    SessionExpired(#[from] RefreshError),

    /// A 401 that was not eligible for refresh (already retried, or a public route).
    #[error("unauthorized")]
    Unauthorized,

    #[error("http error {status}{}", suffix(.message))]
    Http { status: u16, message: Option<String> },

    #[error("invalid json")]
    Json(#[from] serde_json::Error),

    /// An auth response that should have started a session carried no tokens.
    #[error("response did not contain session tokens")]
    MissingSession,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }
}
