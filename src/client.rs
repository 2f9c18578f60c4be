use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{ApiError, RefreshError, Result, StorageError, TransportError};
use crate::navigator::{Navigator, NoopNavigator};
use crate::redact::redact_secrets;
use crate::routes;
use crate::state::{
    GateEntry, KeyringStorage, MemoryStorage, RefreshGate, RefreshOutcome, Session,
    SessionStorage, KEY_ACCESS_TOKEN,
};
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
use crate::types::{
    extract_error_message, extract_session, ApiRequest, ApiResponse, ForgotPasswordPayload,
    LoginPayload, Method, RefreshTokenPayload, RegisterPayload, ResetPasswordPayload,
    SessionTokens, UserIdentity, VerifyEmailPayload,
};

impl ApiResponse {
    /// Deserializes the whole body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(Deserialize::deserialize(&self.body)?)
    }

    /// Deserializes the `data` member when the backend wrapped the payload,
    /// the whole body otherwise.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        let inner = self.body.get("data").unwrap_or(&self.body);
        Ok(Deserialize::deserialize(inner)?)
    }
}

fn to_body<B: Serialize + ?Sized>(body: &B) -> Result<Value> {
    Ok(serde_json::to_value(body)?)
}

fn error_message(body: &Value) -> Option<String> {
    extract_error_message(body).map(|m| redact_secrets(&m).into_owned())
}

/// Falls back to process memory when `preferred` cannot be reached at all.
/// A store that answers, even with a corrupt value, is kept.
fn usable_storage(preferred: Arc<dyn SessionStorage>) -> Arc<dyn SessionStorage> {
    match preferred.get(KEY_ACCESS_TOKEN) {
        Err(StorageError::Unavailable(reason)) => {
            tracing::warn!(%reason, "secure storage unavailable; session will not outlive the process");
            Arc::new(MemoryStorage::new())
        }
        _ => preferred,
    }
}

/// Authenticated client for the banking backend.
///
/// Attaches the session's access token to every protected call. A `401`
/// triggers at most one refresh at a time; every request that failed while
/// it was in flight waits for it and replays once with the new token.
/// Cloning is cheap and clones share the session and the refresh gate.
#[derive(Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    session: Session,
    gate: RefreshGate,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Self> {
        Ok(Self {
            config: Arc::new(config),
            transport,
            session: Session::load(storage)?,
            gate: RefreshGate::new(),
            navigator: Arc::new(NoopNavigator),
        })
    }

    /// Production wiring: `reqwest` transport and OS keyring storage, or
    /// memory storage when no keychain can be reached.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        let keyring = Arc::new(KeyringStorage::new(config.keyring_service.clone()));
        Self::new(config, transport, usable_storage(keyring))
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> SessionTokens {
        self.session.tokens()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.session.user()
    }

    /// Sends `request`, refreshing the session and replaying once on `401`.
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        let bearer = self.bearer_for(&request.path);
        let response = self.dispatch(&request, bearer.clone()).await?;

        if response.status != 401 || routes::is_public_route(&request.path) {
            return self.finish(&request.path, response);
        }
        if request.retried {
            tracing::debug!(path = %request.path, "401 on replayed request; giving up");
            return Err(ApiError::Unauthorized);
        }

        let token = self.renew_after_unauthorized(bearer.as_deref()).await?;

        let mut replay = request;
        replay.retried = true;
        tracing::debug!(path = %replay.path, "replaying request with renewed token");
        let response = self.dispatch(&replay, Some(token)).await?;
        if response.status == 401 {
            tracing::debug!(path = %replay.path, "401 on replayed request; giving up");
            return Err(ApiError::Unauthorized);
        }
        self.finish(&replay.path, response)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(ApiRequest::post(path).json(to_body(body)?))
            .await?
            .json()
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(ApiRequest::put(path).json(to_body(body)?))
            .await?
            .json()
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request(ApiRequest::patch(path).json(to_body(body)?))
            .await?
            .json()
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.request(ApiRequest::delete(path)).await
    }

    /// Signs in. The tokens in the response replace any previous session,
    /// fields included that the response leaves out.
    pub async fn login(&self, payload: &LoginPayload) -> Result<SessionTokens> {
        let response = self
            .request(ApiRequest::post(routes::LOGIN).json(to_body(payload)?))
            .await?;
        let tokens = extract_session(&response.body).ok_or(ApiError::MissingSession)?;
        tracing::info!(user = ?tokens.user.as_ref().map(|u| &u.id), "signed in");
        Ok(tokens)
    }

    pub async fn register(&self, payload: &RegisterPayload) -> Result<ApiResponse> {
        self.request(ApiRequest::post(routes::REGISTER).json(to_body(payload)?))
            .await
    }

    pub async fn forgot_password(&self, payload: &ForgotPasswordPayload) -> Result<ApiResponse> {
        self.request(ApiRequest::post(routes::FORGOT_PASSWORD).json(to_body(payload)?))
            .await
    }

    pub async fn reset_password(&self, payload: &ResetPasswordPayload) -> Result<ApiResponse> {
        self.request(ApiRequest::post(routes::RESET_PASSWORD).json(to_body(payload)?))
            .await
    }

    pub async fn verify_email(&self, payload: &VerifyEmailPayload) -> Result<ApiResponse> {
        self.request(ApiRequest::post(routes::VERIFY_EMAIL).json(to_body(payload)?))
            .await
    }

    /// Best-effort server-side logout; the local session is cleared whatever
    /// the backend answers.
    pub async fn logout(&self) {
        let tokens = self.session.tokens();
        let body = tokens
            .refresh_token
            .as_deref()
            .map(|refresh_token| serde_json::json!({ "refresh_token": refresh_token }));
        let request = HttpRequest {
            method: Method::Post,
            path: routes::LOGOUT.to_string(),
            bearer: tokens.access_token,
            body,
        };

        match self.transport.send(request).await {
            Ok(res) if res.is_success() => tracing::debug!("server session invalidated"),
            Ok(res) => tracing::warn!(status = res.status, "logout rejected by server"),
            Err(e) => tracing::warn!(error = %e, "logout request failed"),
        }
        self.session.clear();
        tracing::info!("signed out");
    }

    /// Renews the session now. Joins the refresh in flight if there is one.
    pub async fn refresh_session(&self) -> Result<String> {
        Ok(self.renew(|| None).await?)
    }

    fn bearer_for(&self, path: &str) -> Option<String> {
        if routes::is_public_route(path) {
            return None;
        }
        self.session.access_token()
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<String>,
    ) -> std::result::Result<HttpResponse, TransportError> {
        tracing::debug!(
            method = request.method.as_str(),
            path = %request.path,
            authorized = bearer.is_some(),
            retried = request.retried,
            "sending request"
        );
        self.transport
            .send(HttpRequest {
                method: request.method,
                path: request.path.clone(),
                bearer,
                body: request.body.clone(),
            })
            .await
    }

    /// Success bodies may carry tokens; anything else becomes an error.
    ///
    /// Tokens from a sign-in route replace the session and must be stored.
    /// Tokens rotated by any other call are merged in on a best-effort basis,
    /// since the call itself already succeeded.
    fn finish(&self, path: &str, response: HttpResponse) -> Result<ApiResponse> {
        if !response.is_success() {
            return Err(ApiError::Http {
                status: response.status,
                message: error_message(&response.body),
            });
        }

        if let Some(tokens) = extract_session(&response.body) {
            if routes::starts_session(path) {
                if let Err(e) = self.session.replace(tokens) {
                    self.session.clear();
                    return Err(e.into());
                }
            } else if let Err(e) = self.session.persist(tokens) {
                tracing::warn!(error = %e, "failed to store rotated session tokens");
            }
        }
        Ok(ApiResponse {
            status: response.status,
            body: response.body,
        })
    }

    /// A request sent with `used` came back 401. If the session already holds
    /// a different token, that token is returned without refreshing.
    async fn renew_after_unauthorized(&self, used: Option<&str>) -> RefreshOutcome {
        self.renew(|| {
            let current = self.session.access_token()?;
            (used != Some(current.as_str())).then_some(current)
        })
        .await
    }

    /// A waiter whose leader was cancelled enters the gate again, so an
    /// abandoned refresh never reaches callers as an expired session.
    async fn renew(&self, superseded: impl Fn() -> Option<String>) -> RefreshOutcome {
        loop {
            match self.gate.enter(&superseded) {
                GateEntry::Retry(token) => {
                    tracing::debug!("token already renewed; skipping refresh");
                    return Ok(token);
                }
                GateEntry::Wait(waiter) => {
                    tracing::debug!("refresh in flight; waiting for it");
                    match waiter.outcome().await {
                        Err(RefreshError::Abandoned) => {
                            tracing::debug!("refresh abandoned; entering the gate again");
                        }
                        outcome => return outcome,
                    }
                }
                GateEntry::Lead(lease) => {
                    let outcome = self.exchange_refresh_token().await;
                    if let Err(e) = &outcome {
                        self.end_session(e);
                    }
                    let resumed = lease.settle(outcome.clone());
                    tracing::debug!(resumed, ok = outcome.is_ok(), "refresh settled");
                    return outcome;
                }
            }
        }
    }

    /// Trades the stored refresh token for a new pair and stores it.
    async fn exchange_refresh_token(&self) -> RefreshOutcome {
        let Some(refresh_token) = self.session.refresh_token() else {
            return Err(RefreshError::MissingRefreshToken);
        };
        tracing::info!("refreshing access token");

        let body = serde_json::to_value(RefreshTokenPayload {
            refresh_token: &refresh_token,
        })
        .map_err(|e| RefreshError::Transport(e.to_string()))?;
        let request = HttpRequest {
            method: Method::Post,
            path: routes::REFRESH_TOKEN.to_string(),
            bearer: None,
            body: Some(body),
        };

        let sent = tokio::time::timeout(self.config.refresh_timeout(), self.transport.send(request));
        let response = match sent.await {
            Err(_) | Ok(Err(TransportError::Timeout)) => return Err(RefreshError::TimedOut),
            Ok(Err(e)) => return Err(RefreshError::Transport(e.to_string())),
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status,
                message: error_message(&response.body),
            });
        }

        let tokens = extract_session(&response.body).ok_or(RefreshError::InvalidResponse)?;
        let access_token = tokens
            .access_token
            .clone()
            .ok_or(RefreshError::InvalidResponse)?;
        // Servers that do not rotate refresh tokens keep accepting the one just sent.
        let renewed = SessionTokens {
            access_token: Some(access_token.clone()),
            refresh_token: tokens.refresh_token.or(Some(refresh_token)),
            user: tokens.user.or_else(|| self.session.user()),
        };
        self.session
            .replace(renewed)
            .map_err(|e| RefreshError::Storage(e.to_string()))?;
        tracing::info!("access token refreshed");
        Ok(access_token)
    }

    fn end_session(&self, error: &RefreshError) {
        tracing::warn!(%error, "session could not be renewed; signing out");
        self.session.clear();
        self.navigator.navigate(&self.config.login_route);
    }
}
