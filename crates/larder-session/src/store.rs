//! In-process session store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::backend::Backend;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::exchange::{IdentifierSource, validate_name};
use crate::gc::{self, EvictionEvents, EvictionObserver, GcHandle};
use crate::id::claim_unique_id;
use crate::session::Session;
use crate::table::{SessionTable, TableEntry};

/// Session store backed by an in-memory [`SessionTable`].
///
/// This store provides:
/// - Isolated copies on every hit, so handlers never share payloads
/// - Collision-free id generation with bounded retries
/// - A background eviction loop, optionally publishing what it removes
///
/// The eviction loop is stopped by [`shutdown`](MemoryStore::shutdown) or
/// when the store is dropped.
#[derive(Debug)]
pub struct MemoryStore {
    table: Arc<SessionTable>,
    config: StoreConfig,
    observer: Option<EvictionObserver>,
    gc: Option<GcHandle>,
}

impl MemoryStore {
    /// Create a store with its own table.
    ///
    /// Must be called within a tokio runtime when the eviction loop is enabled.
    pub fn new(config: StoreConfig) -> Result<Self> {
        Self::build(config, Arc::new(SessionTable::new()), None)
    }

    /// Create a store over an existing table.
    pub fn with_table(config: StoreConfig, table: Arc<SessionTable>) -> Result<Self> {
        Self::build(config, table, None)
    }

    /// Create a store that publishes every batch of evicted sessions.
    ///
    /// Up to `capacity` batches are buffered. When the buffer is full the
    /// eviction loop waits for the consumer, so the receiver must be drained.
    pub fn with_eviction_events(
        config: StoreConfig,
        capacity: usize,
    ) -> Result<(Self, EvictionEvents)> {
        let (observer, events) = EvictionObserver::channel(capacity);
        let store = Self::build(config, Arc::new(SessionTable::new()), Some(observer))?;
        Ok((store, events))
    }

    fn build(
        config: StoreConfig,
        table: Arc<SessionTable>,
        observer: Option<EvictionObserver>,
    ) -> Result<Self> {
        config.validate()?;

        let gc = if config.enable_gc_task {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(Error::InvalidConfig(
                    "the eviction loop requires a running tokio runtime".to_string(),
                ));
            }
            Some(GcHandle::spawn(
                Arc::clone(&table),
                config.gc_interval,
                observer.clone(),
            ))
        } else {
            None
        };

        Ok(Self {
            table,
            config,
            observer,
            gc,
        })
    }

    /// Get the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The underlying table.
    pub fn table(&self) -> &Arc<SessionTable> {
        &self.table
    }

    /// Number of stored sessions, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.table.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.table.is_empty().await
    }

    /// Whether a live session exists for `id`.
    pub async fn contains(&self, id: &str) -> bool {
        self.table.contains(id).await
    }

    /// Isolated copies of every live session.
    pub async fn all_sessions(&self) -> Result<Vec<Session>> {
        let stored = self.table.live_sessions().await;
        stored.iter().map(|session| session.isolated_copy()).collect()
    }

    /// Run one eviction sweep now.
    ///
    /// Returns the number of sessions removed. In observed mode the batch is
    /// published exactly as a background tick would.
    pub async fn evict_expired(&self) -> usize {
        gc::sweep(&self.table, self.observer.as_ref()).await
    }

    /// Stop the eviction loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(gc) = self.gc.take() {
            gc.shutdown().await;
        }
    }

    /// Snapshot `session` for the table, restarting its lifetime on both
    /// the caller's handle and the stored copy.
    fn stored_copy(session: &Session) -> Result<TableEntry> {
        let expires_at = session.renew_expiry();
        let snapshot = session.isolated_copy()?;
        Ok(TableEntry::new(Arc::new(snapshot), expires_at))
    }
}

#[async_trait]
impl Backend for MemoryStore {
    async fn lookup_or_create(
        &self,
        source: &(dyn IdentifierSource + Sync),
        name: &str,
    ) -> Result<Session> {
        validate_name(name)?;

        if let Some(id) = source.read_identifier(name) {
            match self.table.get(&id).await {
                // The copy is taken after the table lock has been released.
                Some(stored) if stored.name() == name => {
                    let session = stored.isolated_copy()?;
                    session.set_fresh(false);
                    trace!(session_id = %id, session_name = %name, "Session hit");
                    return Ok(session);
                }
                Some(_) => debug!(session_id = %id, session_name = %name, "Session id belongs to another slot"),
                None => debug!(session_id = %id, session_name = %name, "Session miss"),
            }
        }

        self.new_session(name).await
    }

    async fn new_session(&self, name: &str) -> Result<Session> {
        validate_name(name)?;
        let cookie = &self.config.cookie;
        let table = &self.table;

        let session = claim_unique_id(
            self.config.id_length,
            self.config.max_id_attempts,
            |id| async move {
                let session = Session::new(name, id, cookie.clone());
                let entry = Self::stored_copy(&session)?;
                Ok::<_, Error>(table.try_insert(entry).await.then_some(session))
            },
        )
        .await?;

        debug!(session_id = %session.id(), session_name = %name, "Created new session");
        Ok(session)
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let entry = Self::stored_copy(session)?;
        self.table.upsert(entry).await;
        trace!(session_id = %session.id(), "Session saved");
        Ok(())
    }

    async fn delete(&self, session: &Session) -> Result<()> {
        if self.table.remove(session.id()).await {
            debug!(session_id = %session.id(), "Session deleted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{IssuedIdentifiers, NoIdentifier};
    use crate::value::Value;
    use std::collections::HashMap;
    use std::time::Duration;

    fn config() -> StoreConfig {
        StoreConfig::new().with_gc_task(false)
    }

    fn presenting(name: &str, id: &str) -> HashMap<String, String> {
        HashMap::from([(name.to_string(), id.to_string())])
    }

    #[tokio::test]
    async fn test_miss_creates_fresh_session() {
        let store = MemoryStore::new(config()).unwrap();
        let session = store.lookup_or_create(&NoIdentifier, "s1").await.unwrap();

        assert!(session.is_fresh());
        assert_eq!(session.name(), "s1");
        assert_eq!(session.id().len(), 32);
        assert!(store.contains(session.id()).await);
    }

    #[tokio::test]
    async fn test_unknown_id_is_a_miss() {
        let store = MemoryStore::new(config()).unwrap();
        let session = store
            .lookup_or_create(&presenting("s1", "forged"), "s1")
            .await
            .unwrap();
        assert!(session.is_fresh());
        assert_ne!(session.id(), "forged");
    }

    #[tokio::test]
    async fn test_hit_returns_isolated_copy() {
        let store = MemoryStore::new(config()).unwrap();
        let session = store.new_session("s1").await.unwrap();
        session.set("name", "Coco").unwrap();
        store.save(&session).await.unwrap();

        let source = presenting("s1", session.id());
        let first = store.lookup_or_create(&source, "s1").await.unwrap();
        assert!(!first.is_fresh());
        assert_eq!(first.get("name"), Some(Value::from("Coco")));

        first.set("name", "Momo").unwrap();
        let second = store.lookup_or_create(&source, "s1").await.unwrap();
        assert_eq!(second.get("name"), Some(Value::from("Coco")));
        // The caller's handle is untouched by the save either.
        session.set("name", "Lulu").unwrap();
        let third = store.lookup_or_create(&source, "s1").await.unwrap();
        assert_eq!(third.get("name"), Some(Value::from("Coco")));
    }

    #[tokio::test]
    async fn test_id_from_other_slot_is_a_miss() {
        let store = MemoryStore::new(config()).unwrap();
        let cart = store.new_session("cart").await.unwrap();

        let session = store
            .lookup_or_create(&presenting("prefs", cart.id()), "prefs")
            .await
            .unwrap();
        assert!(session.is_fresh());
        assert_ne!(session.id(), cart.id());
    }

    #[tokio::test]
    async fn test_invalid_name() {
        let store = MemoryStore::new(config()).unwrap();
        let result = store.lookup_or_create(&NoIdentifier, "bad name").await;
        assert!(matches!(result, Err(Error::InvalidName(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_then_lookup_misses() {
        let store = MemoryStore::new(config()).unwrap();
        let session = store.new_session("s1").await.unwrap();
        store.delete(&session).await.unwrap();
        store.delete(&session).await.unwrap();

        let again = store
            .lookup_or_create(&presenting("s1", session.id()), "s1")
            .await
            .unwrap();
        assert!(again.is_fresh());
    }

    #[tokio::test]
    async fn test_persist_issues_identifier() {
        let store = MemoryStore::new(config()).unwrap();
        let session = store.new_session("s1").await.unwrap();
        session.set_path("/app");

        let mut issued = IssuedIdentifiers::new();
        store.persist(&mut issued, &session).await.unwrap();

        let latest = issued.latest("s1").unwrap();
        assert_eq!(latest.id, session.id());
        assert_eq!(latest.config.path, "/app");
    }

    #[tokio::test]
    async fn test_save_recomputes_table_expiry() {
        let store = MemoryStore::new(config()).unwrap();
        let session = store.new_session("s1").await.unwrap();
        let initial = store.table().expiry_of(session.id()).await.unwrap();

        session.set_max_age(Duration::from_secs(3600));
        store.save(&session).await.unwrap();
        let extended = store.table().expiry_of(session.id()).await.unwrap();
        assert!(extended > initial);
    }

    #[tokio::test]
    async fn test_resave_renews_expiry_seen_by_hits() {
        let store = MemoryStore::new(config()).unwrap();
        let session = store.new_session("s1").await.unwrap();
        let created = session.expires_at();

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.save(&session).await.unwrap();
        let renewed = store.table().expiry_of(session.id()).await.unwrap();
        assert!(renewed > created);
        assert_eq!(session.expires_at(), renewed);

        let hit = store
            .lookup_or_create(&presenting("s1", session.id()), "s1")
            .await
            .unwrap();
        assert_eq!(hit.expires_at(), renewed);
    }

    #[tokio::test]
    async fn test_zero_max_age_expires_on_save() {
        let store = MemoryStore::new(config()).unwrap();
        let session = store.new_session("s1").await.unwrap();
        session.set_max_age(Duration::ZERO);
        store.save(&session).await.unwrap();

        assert!(!store.contains(session.id()).await);
        assert_eq!(store.evict_expired().await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_tiny_id_space_exhausts() {
        let store = MemoryStore::new(config().with_id_length(1).with_max_id_attempts(4)).unwrap();
        let mut result = Ok(());
        for _ in 0..200 {
            if let Err(e) = store.new_session("s").await {
                result = Err(e);
                break;
            }
        }
        assert!(matches!(result, Err(Error::ExhaustedIdSpace { attempts: 4 })));
        assert!(store.len().await <= 62);
    }

    #[tokio::test]
    async fn test_all_sessions_are_copies() {
        let store = MemoryStore::new(config()).unwrap();
        for _ in 0..3 {
            store.new_session("s").await.unwrap();
        }
        let all = store.all_sessions().await.unwrap();
        assert_eq!(all.len(), 3);
        all[0].set("x", 1).unwrap();
        let again = store.all_sessions().await.unwrap();
        assert!(again.iter().all(|s| s.is_empty()));
    }

    #[test]
    fn test_gc_requires_runtime() {
        let result = MemoryStore::new(StoreConfig::new());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
