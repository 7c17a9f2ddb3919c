//! The session entity.
//!
//! A [`Session`] owns its payload and cookie attributes behind a private
//! read/write lock. Every accessor takes the lock for the duration of a
//! single call and returns copies, never references into the guarded state.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{CookieConfig, SameSite, expiry_from};
use crate::copy;
use crate::error::Result;
use crate::value::Value;

/// Mutable state guarded by the session lock.
#[derive(Debug)]
struct SessionState {
    values: HashMap<String, Value>,
    cookie: CookieConfig,
    is_fresh: bool,
    expires_at: DateTime<Utc>,
}

/// One client's server-side state.
pub struct Session {
    name: String,
    id: String,
    state: RwLock<SessionState>,
}

impl Session {
    /// Create a fresh, empty session expiring `cookie.max_age` from now.
    pub fn new(name: impl Into<String>, id: impl Into<String>, cookie: CookieConfig) -> Self {
        let expires_at = expiry_from(Utc::now(), cookie.max_age);
        Self {
            name: name.into(),
            id: id.into(),
            state: RwLock::new(SessionState {
                values: HashMap::new(),
                cookie,
                is_fresh: true,
                expires_at,
            }),
        }
    }

    /// Name of the session slot (and of the cookie carrying its id).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.read().values.get(key).cloned()
    }

    /// Get the value under `key` converted into `T`.
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key).map(|v| v.deserialize_into()).transpose()
    }

    /// Insert or overwrite the value under `key`.
    ///
    /// Values that could not later be copied or serialized are rejected
    /// here with [`Error::UnsupportedType`](crate::Error::UnsupportedType).
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        copy::validate(&value)?;
        self.state.write().values.insert(key.into(), value);
        Ok(())
    }

    /// Serialize `value` and store it under `key`.
    pub fn set_serialize<T: Serialize + ?Sized>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        self.set(key, Value::from_serialize(value)?)
    }

    /// Remove the value under `key`, returning it if present.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.state.write().values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.read().values.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.read().values.keys().cloned().collect()
    }

    /// A copy of the whole payload.
    pub fn values(&self) -> HashMap<String, Value> {
        self.state.read().values.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().values.is_empty()
    }

    /// Remove every value.
    pub fn clear(&self) {
        self.state.write().values.clear();
    }

    /// True until the session is returned by a lookup of an existing id.
    pub fn is_fresh(&self) -> bool {
        self.state.read().is_fresh
    }

    pub fn set_fresh(&self, fresh: bool) {
        self.state.write().is_fresh = fresh;
    }

    /// When this session stops being retrievable.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.state.read().expires_at
    }

    /// A copy of the cookie attributes.
    pub fn cookie_config(&self) -> CookieConfig {
        self.state.read().cookie.clone()
    }

    pub fn max_age(&self) -> Duration {
        self.state.read().cookie.max_age
    }

    /// Change the lifetime; the expiry is recomputed as now + `max_age`.
    pub fn set_max_age(&self, max_age: Duration) {
        let mut state = self.state.write();
        state.cookie.max_age = max_age;
        state.expires_at = expiry_from(Utc::now(), max_age);
    }

    /// Restart the lifetime from now with the current `max_age`.
    ///
    /// Backends call this on save, so a stored session expires one full
    /// `max_age` after its last save.
    pub fn renew_expiry(&self) -> DateTime<Utc> {
        let mut state = self.state.write();
        state.expires_at = expiry_from(Utc::now(), state.cookie.max_age);
        state.expires_at
    }

    pub fn path(&self) -> String {
        self.state.read().cookie.path.clone()
    }

    pub fn set_path(&self, path: impl Into<String>) {
        self.state.write().cookie.path = path.into();
    }

    pub fn domain(&self) -> String {
        self.state.read().cookie.domain.clone()
    }

    pub fn set_domain(&self, domain: impl Into<String>) {
        self.state.write().cookie.domain = domain.into();
    }

    pub fn secure(&self) -> bool {
        self.state.read().cookie.secure
    }

    pub fn set_secure(&self, secure: bool) {
        self.state.write().cookie.secure = secure;
    }

    pub fn http_only(&self) -> bool {
        self.state.read().cookie.http_only
    }

    pub fn set_http_only(&self, http_only: bool) {
        self.state.write().cookie.http_only = http_only;
    }

    pub fn same_site(&self) -> SameSite {
        self.state.read().cookie.same_site
    }

    pub fn set_same_site(&self, same_site: SameSite) {
        self.state.write().cookie.same_site = same_site;
    }

    /// An independent copy of this session.
    ///
    /// The payload goes through the isolation copier; the copy keeps the
    /// name, id, freshness, expiry and cookie attributes of the original.
    pub fn isolated_copy(&self) -> Result<Session> {
        let state = self.state.read();
        let values = copy::deep_copy_map(&state.values)?;
        Ok(Session {
            name: self.name.clone(),
            id: self.id.clone(),
            state: RwLock::new(SessionState {
                values,
                cookie: state.cookie.clone(),
                is_fresh: state.is_fresh,
                expires_at: state.expires_at,
            }),
        })
    }

    /// Snapshot every field into a serializable record.
    pub fn to_record(&self) -> SessionRecord {
        let state = self.state.read();
        SessionRecord {
            name: self.name.clone(),
            id: self.id.clone(),
            values: state.values.clone(),
            cookie: state.cookie.clone(),
            is_fresh: state.is_fresh,
            expires_at: state.expires_at,
        }
    }

    /// Rebuild a session from a record, validating its payload.
    pub fn from_record(record: SessionRecord) -> Result<Session> {
        record.values.values().try_for_each(copy::validate)?;
        Ok(Session {
            name: record.name,
            id: record.id,
            state: RwLock::new(SessionState {
                values: record.values,
                cookie: record.cookie,
                is_fresh: record.is_fresh,
                expires_at: record.expires_at,
            }),
        })
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("values", &state.values)
            .field("is_fresh", &state.is_fresh)
            .field("expires_at", &state.expires_at)
            .field("cookie", &state.cookie)
            .finish()
    }
}

/// Serializable form of a [`Session`], without its lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub name: String,
    pub id: String,
    pub values: HashMap<String, Value>,
    pub cookie: CookieConfig,
    pub is_fresh: bool,
    pub expires_at: DateTime<Utc>,
}
