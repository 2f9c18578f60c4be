use std::sync::{Arc, Mutex, MutexGuard};

use super::storage::{SessionStorage, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER, SESSION_KEYS};
use crate::error::StorageError;
use crate::types::{SessionTokens, UserIdentity};

/// In-memory view of the session, written through to storage.
///
/// Reads never touch storage after [`Session::load`]; every write replaces the
/// cached tokens under one lock so readers never observe a half-updated pair.
#[derive(Clone)]
pub struct Session {
    storage: Arc<dyn SessionStorage>,
    current: Arc<Mutex<SessionTokens>>,
}

impl Session {
    /// Restores whatever a previous run left in storage. A corrupt user record
    /// is dropped rather than failing the whole session.
    pub fn load(storage: Arc<dyn SessionStorage>) -> Result<Self, StorageError> {
        let access_token = storage.get(KEY_ACCESS_TOKEN)?;
        let refresh_token = storage.get(KEY_REFRESH_TOKEN)?;
        let user = match storage.get(KEY_USER)? {
            Some(raw) => match serde_json::from_str::<UserIdentity>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unreadable stored user");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            storage,
            current: Arc::new(Mutex::new(SessionTokens {
                access_token,
                refresh_token,
                user,
            })),
        })
    }

    fn current(&self) -> MutexGuard<'_, SessionTokens> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn tokens(&self) -> SessionTokens {
        self.current().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.current().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.current().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.current().user.clone()
    }

    /// Merges `update` into the stored session. Fields the update leaves
    /// empty keep their previous value, so an access-only rotation does not
    /// drop the refresh token.
    pub fn persist(&self, update: SessionTokens) -> Result<(), StorageError> {
        let mut current = self.current();
        let next = SessionTokens {
            access_token: update.access_token.or_else(|| current.access_token.clone()),
            refresh_token: update.refresh_token.or_else(|| current.refresh_token.clone()),
            user: update.user.or_else(|| current.user.clone()),
        };
        self.store(&mut current, next)
    }

    /// Overwrites every field with `tokens`, including the ones it leaves empty.
    pub fn replace(&self, tokens: SessionTokens) -> Result<(), StorageError> {
        let mut current = self.current();
        self.store(&mut current, tokens)
    }

    /// Writes `next` to storage, then to memory. If any key fails, the keys
    /// already written are restored and memory is left untouched.
    fn store(&self, current: &mut SessionTokens, next: SessionTokens) -> Result<(), StorageError> {
        let previous = stored_values(current)?;
        let staged = stored_values(&next)?;

        for (written, (key, value)) in staged.iter().enumerate() {
            if let Err(e) = write_optional(self.storage.as_ref(), key, value.as_deref()) {
                for (key, value) in &previous[..written] {
                    if let Err(e) = write_optional(self.storage.as_ref(), key, value.as_deref()) {
                        tracing::warn!(key, error = %e, "failed to restore session value");
                    }
                }
                return Err(e);
            }
        }

        *current = next;
        Ok(())
    }

    /// Drops every session value. The in-memory copy is always cleared; storage
    /// failures are logged and do not stop the remaining keys from being removed.
    pub fn clear(&self) {
        let mut current = self.current();
        *current = SessionTokens::default();
        for key in SESSION_KEYS {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!(key, error = %e, "failed to remove session value");
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().access_token.is_some()
    }
}

fn stored_values(tokens: &SessionTokens) -> Result<[(&'static str, Option<String>); 3], StorageError> {
    let user = tokens
        .user
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StorageError::Corrupt(e.to_string()))?;
    Ok([
        (KEY_ACCESS_TOKEN, tokens.access_token.clone()),
        (KEY_REFRESH_TOKEN, tokens.refresh_token.clone()),
        (KEY_USER, user),
    ])
}

fn write_optional(
    storage: &dyn SessionStorage,
    key: &str,
    value: Option<&str>,
) -> Result<(), StorageError> {
    match value {
        Some(value) => storage.set(key, value),
        None => storage.remove(key),
    }
}
