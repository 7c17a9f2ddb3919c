//! Key/value transport used by the durable store.
//!
//! The store needs only four remote operations. [`RedisTransport`] speaks
//! them to a Redis server through a pooled connection manager; tests can
//! substitute any other implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::debug;

use crate::error::TransportError;

/// Remote key/value operations with server-enforced expiry.
#[async_trait]
pub trait KvTransport: Send + Sync {
    /// `GET key`. A missing key is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransportError>;

    /// `SET key value` expiring after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), TransportError>;

    /// `DEL key`. Deleting a missing key succeeds.
    async fn del(&self, key: &str) -> Result<(), TransportError>;

    /// `EXISTS key`.
    async fn exists(&self, key: &str) -> Result<bool, TransportError>;
}

#[async_trait]
impl<T: KvTransport + ?Sized> KvTransport for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), TransportError> {
        (**self).set(key, value, ttl).await
    }

    async fn del(&self, key: &str) -> Result<(), TransportError> {
        (**self).del(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, TransportError> {
        (**self).exists(key).await
    }
}

/// Redis transport with connection pooling via `ConnectionManager`.
#[derive(Clone)]
pub struct RedisTransport {
    conn_manager: ConnectionManager,
}

impl RedisTransport {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, TransportError> {
        let client = Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await?;
        debug!(url = %redis_url, "Connected to Redis");
        Ok(Self { conn_manager })
    }
}

#[async_trait]
impl KvTransport for RedisTransport {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        let mut conn = self.conn_manager.clone();
        let bytes: Option<Vec<u8>> = conn.get(key).await?;
        Ok(bytes)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), TransportError> {
        let mut conn = self.conn_manager.clone();
        // PX rejects 0; sub-millisecond lifetimes round up.
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let _: () = conn.pset_ex(key, value, millis).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), TransportError> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, TransportError> {
        let mut conn = self.conn_manager.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }
}
