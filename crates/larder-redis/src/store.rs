//! Durable session store over a remote key/value service.
//!
//! Sessions are stored as:
//! - **Key**: `{key_prefix}{session_id}` → JSON-encoded [`SessionRecord`]
//! - **TTL**: the session's `max_age`, enforced by the server
//!
//! No eviction loop runs here. Every lookup decodes a private copy, so the
//! isolation guarantees of the in-memory store hold without copying.
//!
//! [`SessionRecord`]: larder_session::SessionRecord

use async_trait::async_trait;
use chrono::Utc;
use larder_session::id::claim_unique_id;
use larder_session::{Backend, Error, IdentifierSource, Result, Session, validate_name};
use tracing::{debug, trace, warn};

use crate::codec;
use crate::config::RedisConfig;
use crate::transport::{KvTransport, RedisTransport};

/// Session store persisting to a [`KvTransport`], Redis by default.
pub struct RedisStore<T = RedisTransport> {
    transport: T,
    config: RedisConfig,
}

impl RedisStore<RedisTransport> {
    /// Connect to the Redis server named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a bad configuration and
    /// `BackendUnavailable` if the connection fails.
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        config.validate()?;
        let transport = RedisTransport::connect(&config.url).await?;
        Ok(Self { transport, config })
    }
}

impl<T: KvTransport> RedisStore<T> {
    /// Create a store over an existing transport.
    pub fn with_transport(transport: T, config: RedisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { transport, config })
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get the remote key for a session id.
    pub fn session_key(&self, id: &str) -> String {
        format!("{}{}", self.config.key_prefix, id)
    }

    /// Whether the remote store holds a session for `id`.
    pub async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.transport.exists(&self.session_key(id)).await?)
    }

    /// Fetch and decode the session for `id`.
    ///
    /// Returns `Ok(None)` on a remote miss, or if the record has outlived
    /// its expiry (the server TTL should have removed it already).
    pub async fn load(&self, id: &str) -> Result<Option<Session>> {
        let Some(bytes) = self.transport.get(&self.session_key(id)).await? else {
            return Ok(None);
        };

        let session = codec::decode(&bytes)?;
        if session.expires_at() <= Utc::now() {
            warn!(
                session_id = %id,
                expires_at = %session.expires_at(),
                "Session expired (TTL should have cleaned this up)"
            );
            return Ok(None);
        }
        Ok(Some(session))
    }
}

#[async_trait]
impl<T: KvTransport> Backend for RedisStore<T> {
    async fn lookup_or_create(
        &self,
        source: &(dyn IdentifierSource + Sync),
        name: &str,
    ) -> Result<Session> {
        validate_name(name)?;

        if let Some(id) = source.read_identifier(name) {
            match self.load(&id).await? {
                Some(session) if session.name() == name => {
                    session.set_fresh(false);
                    trace!(session_id = %id, session_name = %name, "Session loaded from Redis");
                    return Ok(session);
                }
                Some(_) => debug!(session_id = %id, session_name = %name, "Session id belongs to another slot"),
                None => debug!(session_id = %id, session_name = %name, "Session not found in Redis"),
            }
        }

        self.new_session(name).await
    }

    async fn new_session(&self, name: &str) -> Result<Session> {
        validate_name(name)?;
        let store = &self.config.store;

        let id = claim_unique_id(store.id_length, store.max_id_attempts, |id| async move {
            let taken = self.exists(&id).await?;
            Ok::<_, Error>((!taken).then_some(id))
        })
        .await?;

        let session = Session::new(name, id, store.cookie.clone());
        self.save(&session).await?;

        debug!(session_id = %session.id(), session_name = %name, "Created new session in Redis");
        Ok(session)
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let key = self.session_key(session.id());
        let ttl = session.max_age();

        if ttl.is_zero() {
            self.transport.del(&key).await?;
            debug!(session_id = %session.id(), "Session saved with zero lifetime, removed");
            return Ok(());
        }

        // The encoded expiry must track the server TTL set below.
        session.renew_expiry();
        // Encoding takes the session lock; it is released before any I/O.
        let bytes = codec::encode(session)?;
        self.transport.set(&key, bytes, ttl).await?;

        trace!(
            session_id = %session.id(),
            ttl_ms = ttl.as_millis() as u64,
            "Session saved to Redis"
        );
        Ok(())
    }

    async fn delete(&self, session: &Session) -> Result<()> {
        self.transport.del(&self.session_key(session.id())).await?;
        debug!(session_id = %session.id(), "Session deleted from Redis");
        Ok(())
    }
}
