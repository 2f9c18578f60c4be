//! In-memory backend for exercising the client without a network.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{StorageError, TransportError};
use crate::navigator::Navigator;
use crate::routes;
use crate::state::{MemoryStorage, SessionStorage};
use crate::transport::{HttpRequest, HttpResponse, Transport};

#[derive(Debug, Clone)]
pub(crate) enum RefreshBehavior {
    /// Answer with this pair, nested under `data`.
    Issue { access: String, refresh: String },
    /// Answer with this status and an error body.
    Reject(u16),
    /// Fail at the transport level.
    Unreachable,
}

pub(crate) struct FakeBackend {
    valid_token: Mutex<String>,
    refresh: Mutex<RefreshBehavior>,
    refresh_delay: Duration,
    logout_status: u16,
    login_body: Option<Value>,
    before_unauthorized: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    requests: Mutex<Vec<HttpRequest>>,
    refresh_calls: AtomicUsize,
}

impl FakeBackend {
    /// Protected routes accept only `valid_token`.
    pub(crate) fn new(valid_token: &str, refresh: RefreshBehavior) -> Self {
        Self {
            valid_token: Mutex::new(valid_token.to_string()),
            refresh: Mutex::new(refresh),
            refresh_delay: Duration::from_millis(20),
            logout_status: 204,
            login_body: None,
            before_unauthorized: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub(crate) fn with_logout_status(mut self, status: u16) -> Self {
        self.logout_status = status;
        self
    }

    /// Answer successful logins with `body` instead of the nested fixture.
    pub(crate) fn with_login_body(mut self, body: Value) -> Self {
        self.login_body = Some(body);
        self
    }

    /// Runs `hook` once, right before the next 401 is returned.
    pub(crate) fn before_next_unauthorized(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_unauthorized.lock().unwrap() = Some(Box::new(hook));
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    fn respond(status: u16, body: Value) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse { status, body })
    }

    async fn handle_refresh(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.refresh_delay).await;

        let behavior = self.refresh.lock().unwrap().clone();
        match behavior {
            RefreshBehavior::Issue { access, refresh } => {
                assert!(
                    request.body.as_ref().and_then(|b| b.get("refresh_token")).is_some(),
                    "refresh call without refresh_token"
                );
                *self.valid_token.lock().unwrap() = access.clone();
                Self::respond(
                    200,
                    json!({ "data": { "access_token": access, "refresh_token": refresh } }),
                )
            }
            RefreshBehavior::Reject(status) => {
                Self::respond(status, json!({ "message": "Refresh token expired" }))
            }
            RefreshBehavior::Unreachable => {
                Err(TransportError::Network("connection refused".to_string()))
            }
        }
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        match request.path.as_str() {
            routes::REFRESH_TOKEN => self.handle_refresh(&request).await,
            routes::LOGIN => {
                let password = request.body.as_ref().and_then(|b| b.get("password"));
                if password.and_then(Value::as_str) == Some("wrong") {
                    return Self::respond(401, json!({ "message": "Invalid credentials" }));
                }
                let data: Value = match &self.login_body {
                    Some(body) => body.clone(),
                    None => serde_json::from_str(include_str!("fixtures/login_nested.json")).unwrap(),
                };
                if let Some(access) = crate::types::extract_session(&data).and_then(|t| t.access_token) {
                    *self.valid_token.lock().unwrap() = access;
                }
                Self::respond(200, data)
            }
            routes::REGISTER | routes::FORGOT_PASSWORD | routes::RESET_PASSWORD
            | routes::VERIFY_EMAIL => Self::respond(200, json!({ "message": "ok" })),
            routes::LOGOUT => Self::respond(self.logout_status, Value::Null),
            path => {
                let valid = self.valid_token.lock().unwrap().clone();
                if request.bearer.as_deref() != Some(valid.as_str()) {
                    let hook = self.before_unauthorized.lock().unwrap().take();
                    if let Some(hook) = hook {
                        hook();
                    }
                    return Self::respond(401, json!({ "message": "Token expired" }));
                }
                match path {
                    "/transfers/over-limit" => Self::respond(
                        422,
                        json!({ "data": { "message": "Amount exceeds daily limit" } }),
                    ),
                    "/session/rotate" => {
                        *self.valid_token.lock().unwrap() = "T3".to_string();
                        Self::respond(200, json!({ "access_token": "T3", "user": { "id": "usr_7" } }))
                    }
                    _ => Self::respond(200, json!({ "path": path, "token": valid })),
                }
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub(crate) fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        self.routes.lock().unwrap().push(route.to_string());
    }
}

/// Memory storage whose writes can be made to fail, per key or entirely.
#[derive(Default)]
pub(crate) struct FlakyStorage {
    inner: MemoryStorage,
    failing_key: Mutex<Option<String>>,
    offline: bool,
}

impl FlakyStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every call fails, as with a locked or missing keychain.
    pub(crate) fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub(crate) fn fail_writes_to(&self, key: &str) {
        *self.failing_key.lock().unwrap() = Some(key.to_string());
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.offline {
            return Err(StorageError::Unavailable("keychain locked".to_string()));
        }
        Ok(())
    }
}

impl SessionStorage for FlakyStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        if self.failing_key.lock().unwrap().as_deref() == Some(key) {
            return Err(StorageError::Unavailable(format!("cannot write {key}")));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.remove(key)
    }
}
