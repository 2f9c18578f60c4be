use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Access/refresh pair as the client holds it for the duration of a session.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct SessionTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserIdentity>,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &self.access_token.as_ref().map(|_| "REDACTED"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "REDACTED"))
            .field("user", &self.user)
            .finish()
    }
}

impl SessionTokens {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.user.is_none()
    }
}

/// Session fields as the backend sends them, at either nesting level.
#[derive(Debug, Clone, Default, Deserialize)]
struct SessionPayload {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<UserIdentity>,
}

impl SessionPayload {
    fn access_token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Where a response carried its session tokens.
#[derive(Debug, Clone)]
pub enum TokenEnvelope {
    Nested(SessionTokens),
    TopLevel(SessionTokens),
}

impl TokenEnvelope {
    /// Finds the tokens in a response body. The nested `data` shape wins when it
    /// carries an access token; otherwise the top level is checked.
    pub fn locate(body: &Value) -> Option<Self> {
        if let Some(payload) = read_payload(body.get("data")) {
            return Some(Self::Nested(payload.into()));
        }
        read_payload(Some(body)).map(|payload| Self::TopLevel(payload.into()))
    }

    pub fn into_tokens(self) -> SessionTokens {
        match self {
            Self::Nested(tokens) | Self::TopLevel(tokens) => tokens,
        }
    }
}

fn read_payload(value: Option<&Value>) -> Option<SessionPayload> {
    let value = value.filter(|v| v.is_object())?;
    let payload = SessionPayload::deserialize(value).ok()?;
    payload.access_token().is_some().then_some(payload)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl From<SessionPayload> for SessionTokens {
    fn from(payload: SessionPayload) -> Self {
        Self {
            access_token: non_empty(payload.access_token),
            refresh_token: non_empty(payload.refresh_token),
            user: payload.user,
        }
    }
}

/// Returns `None` when neither envelope shape holds an access token.
pub fn extract_session(body: &Value) -> Option<SessionTokens> {
    TokenEnvelope::locate(body).map(TokenEnvelope::into_tokens)
}

/// Backend error body: `{"message": "...", "errors": ...}`, optionally under `data`.
pub fn extract_error_message(body: &Value) -> Option<String> {
    let read = |v: &Value| {
        v.get("message")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    read(body).or_else(|| body.get("data").and_then(read))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// A request as callers describe it. `retried` marks the single replay that
/// follows a refresh, so a second 401 is never re-queued.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub(crate) retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends a percent-encoded query parameter to the path.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        let sep = if self.path.contains('?') { '&' } else { '?' };
        self.path = format!(
            "{}{sep}{}={}",
            self.path,
            urlencoding::encode(key),
            urlencoding::encode(value)
        );
        self
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterPayload {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForgotPasswordPayload {
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetPasswordPayload {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyEmailPayload {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RefreshTokenPayload<'a> {
    pub refresh_token: &'a str,
}
