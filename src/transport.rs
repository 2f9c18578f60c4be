use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde_json::Value;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ConfigError, TransportError};
use crate::redact::redact_secrets;
use crate::types::Method;

/// One outbound call, after the client has decided on authorization.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to the backend. Any HTTP status is a successful send; only
/// failures to obtain a response are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

fn build_common_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("bank-session-client/", env!("CARGO_PKG_VERSION"))),
    );
    headers
}

fn bearer_header(token: &str) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}")).ok()?;
    value.set_sensitive(true);
    Some(value)
}

/// Turns a raw body into JSON. Empty bodies become `null`; text that is not
/// JSON is kept as a string so error messages survive.
fn parse_body(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }
    let message = redact_secrets(&err.to_string()).to_string();
    if err.is_body() || err.is_decode() {
        TransportError::Body(message)
    } else {
        TransportError::Network(message)
    }
}

/// Production transport backed by `reqwest`.
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let base_url = config.base_url()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .default_headers(build_common_headers())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        join_path(&self.base_url, path)
    }
}

/// Appends `path` to the base url, keeping any path prefix the base carries
/// (`https://host/api` + `/accounts` -> `https://host/api/accounts`).
fn join_path(base: &Url, path: &str) -> Result<Url, TransportError> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| TransportError::InvalidUrl(e.to_string()))
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.url_for(&request.path)?;
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.http.request(method, url);
        if let Some(value) = request.bearer.as_deref().and_then(bearer_header) {
            builder = builder.header(AUTHORIZATION, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let res = builder.send().await.map_err(map_reqwest_error)?;
        let status = res.status().as_u16();
        let text = res.text().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse {
            status,
            body: parse_body(&text),
        })
    }
}
