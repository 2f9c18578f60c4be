mod client;
pub mod config;
pub mod error;
mod navigator;
mod redact;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::{ApiError, RefreshError, Result, StorageError, TransportError};
pub use navigator::{Navigator, NoopNavigator};
pub use redact::redact_secrets;
pub use state::{KeyringStorage, MemoryStorage, SessionStorage};
pub use transport::{ReqwestTransport, Transport};
pub use types::{ApiRequest, ApiResponse, Method, SessionTokens, UserIdentity};
