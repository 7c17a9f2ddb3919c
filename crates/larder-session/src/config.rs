//! Configuration for session stores and the cookies they hand out.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default length of generated session ids.
/// 32 characters over a 62-symbol alphabet is roughly 190 bits.
pub const DEFAULT_ID_LENGTH: usize = 32;

/// Default lifetime of a session and of its cookie.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60);

/// Default interval between eviction sweeps.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_millis(500);

/// Default number of id candidates tried before giving up.
pub const DEFAULT_MAX_ID_ATTEMPTS: usize = 16;

/// The `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// Attribute omitted; the user agent applies its own default.
    Default,
    Lax,
    #[default]
    Strict,
    /// Requires `secure`.
    None,
}

/// Cookie attributes attached to a session identifier on the response side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieConfig {
    pub path: String,
    pub domain: String,
    /// Lifetime of the cookie and of the server-side session.
    pub max_age: Duration,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: String::new(),
            max_age: DEFAULT_MAX_AGE,
            secure: true,
            http_only: true,
            same_site: SameSite::Strict,
        }
    }
}

impl CookieConfig {
    /// Create a cookie configuration with secure defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Reject attribute combinations that user agents refuse.
    pub fn validate(&self) -> Result<()> {
        if self.same_site == SameSite::None && !self.secure {
            return Err(Error::InvalidConfig(
                "cookies with SameSite=None must be Secure".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for a session store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Length of generated session ids, in characters.
    pub id_length: usize,

    /// Number of id candidates tried before failing with
    /// [`Error::ExhaustedIdSpace`].
    pub max_id_attempts: usize,

    /// Whether to run the background eviction loop.
    /// If false, expired sessions are only dropped on access or by an
    /// explicit sweep.
    pub enable_gc_task: bool,

    /// Interval between eviction sweeps.
    pub gc_interval: Duration,

    /// Cookie attributes given to every new session.
    pub cookie: CookieConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            id_length: DEFAULT_ID_LENGTH,
            max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
            enable_gc_task: true,
            gc_interval: DEFAULT_GC_INTERVAL,
            cookie: CookieConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the length of generated session ids.
    pub fn with_id_length(mut self, length: usize) -> Self {
        self.id_length = length;
        self
    }

    /// Set how many id candidates are tried before giving up.
    pub fn with_max_id_attempts(mut self, attempts: usize) -> Self {
        self.max_id_attempts = attempts;
        self
    }

    /// Enable or disable the background eviction loop.
    pub fn with_gc_task(mut self, enabled: bool) -> Self {
        self.enable_gc_task = enabled;
        self
    }

    /// Set the eviction interval.
    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    /// Replace the cookie attributes.
    pub fn with_cookie(mut self, cookie: CookieConfig) -> Self {
        self.cookie = cookie;
        self
    }

    /// Set the session lifetime.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.cookie.max_age = max_age;
        self
    }

    /// Check every field, including the cookie attributes.
    pub fn validate(&self) -> Result<()> {
        if self.id_length == 0 {
            return Err(Error::InvalidConfig(
                "session id length must be greater than 0".to_string(),
            ));
        }
        if self.max_id_attempts == 0 {
            return Err(Error::InvalidConfig(
                "id attempts must be greater than 0".to_string(),
            ));
        }
        if self.gc_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "GC interval must be greater than 0".to_string(),
            ));
        }
        self.cookie.validate()
    }
}

/// Absolute expiry for something that lives `max_age` past `now`.
/// Saturates instead of overflowing for absurdly long lifetimes.
pub(crate) fn expiry_from(now: DateTime<Utc>, max_age: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(max_age)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
