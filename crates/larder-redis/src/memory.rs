//! In-process transport for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::transport::KvTransport;

/// A [`KvTransport`] over a local map with lazy TTL expiry.
///
/// Can be switched into a failing state to exercise outage handling.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
    unavailable: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of unexpired keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|(_, deadline)| *deadline > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining lifetime of `key`, if present.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .and_then(|(_, deadline)| deadline.checked_duration_since(now))
    }

    /// Store raw bytes, bypassing any encoding.
    pub fn insert_raw(&self, key: impl Into<String>, value: Vec<u8>, ttl: Duration) {
        let now = Instant::now();
        // Lifetimes past what Instant can represent are clamped to a century.
        let deadline = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 24 * 3600));
        self.entries.lock().insert(key.into(), (value, deadline));
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }

    fn live(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some((value, deadline)) if *deadline > now => return Some(value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }
}

#[async_trait]
impl KvTransport for MemoryTransport {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TransportError> {
        self.check()?;
        Ok(self.live(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), TransportError> {
        self.check()?;
        self.insert_raw(key, value, ttl);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), TransportError> {
        self.check()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, TransportError> {
        self.check()?;
        Ok(self.live(key).is_some())
    }
}
