//! Configuration for the Redis-backed store.

use larder_session::{Result, StoreConfig};

/// Default Redis connection URL.
pub const DEFAULT_URL: &str = "redis://127.0.0.1:6379";

/// Default prefix for session keys.
pub const DEFAULT_KEY_PREFIX: &str = "session:";

/// Configuration for [`RedisStore`](crate::RedisStore).
///
/// The eviction settings of `store` are ignored; Redis expires keys itself.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379").
    pub url: String,

    /// Prefix prepended to every session id to form its key.
    pub key_prefix: String,

    /// Id generation and cookie settings.
    pub store: StoreConfig,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            store: StoreConfig::default().with_gc_task(false),
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate()
    }
}
