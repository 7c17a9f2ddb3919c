//! The in-memory session table.
//!
//! Maps ids to stored sessions plus the expiry used for eviction. The table
//! lock guards only this index; session content has its own lock and is
//! copied by callers after the table lock is released.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::session::Session;

/// A stored session and the instant it becomes evictable.
///
/// The expiry is tracked here, apart from the session's own view of it, so
/// that sweeps never need the session lock.
#[derive(Debug, Clone)]
pub struct TableEntry {
    pub session: Arc<Session>,
    pub expires_at: DateTime<Utc>,
}

impl TableEntry {
    pub fn new(session: Arc<Session>, expires_at: DateTime<Utc>) -> Self {
        Self {
            session,
            expires_at,
        }
    }

    /// Whether the entry is evictable at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Concurrency-guarded mapping from session id to [`TableEntry`].
#[derive(Debug, Default)]
pub struct SessionTable {
    entries: RwLock<HashMap<String, TableEntry>>,
}

impl SessionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Whether a live (unexpired) entry exists for `id`.
    pub async fn contains(&self, id: &str) -> bool {
        let now = Utc::now();
        self.entries
            .read()
            .await
            .get(id)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Eviction expiry recorded for `id`.
    pub async fn expiry_of(&self, id: &str) -> Option<DateTime<Utc>> {
        self.entries.read().await.get(id).map(|entry| entry.expires_at)
    }

    /// The stored session for `id`, if live.
    ///
    /// An entry that has expired but not yet been swept is removed and
    /// reported as absent.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        {
            let entries = self.entries.read().await;
            match entries.get(id) {
                None => return None,
                Some(entry) if !entry.is_expired(Utc::now()) => {
                    trace!(session_id = %id, "Session found in table");
                    return Some(Arc::clone(&entry.session));
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        let now = Utc::now();
        if entries.get(id).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(id);
            debug!(session_id = %id, "Session expired, removing from table");
        }
        None
    }

    /// Insert `entry` only if its id is not present at all.
    ///
    /// Returns false on collision. Expired ids are not reused so that a stale
    /// cookie can never land on someone else's session.
    pub async fn try_insert(&self, entry: TableEntry) -> bool {
        let mut entries = self.entries.write().await;
        match entries.entry(entry.session.id().to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                trace!(session_id = %slot.key(), "Session inserted into table");
                slot.insert(entry);
                true
            }
        }
    }

    /// Insert or replace the entry for the entry's session id.
    pub async fn upsert(&self, entry: TableEntry) {
        let id = entry.session.id().to_string();
        let mut entries = self.entries.write().await;
        entries.insert(id, entry);
        trace!(cache_size = entries.len(), "Session upserted into table");
    }

    /// Remove the entry for `id`. Returns whether one existed.
    pub async fn remove(&self, id: &str) -> bool {
        self.entries.write().await.remove(id).is_some()
    }

    /// Every live stored session.
    pub async fn live_sessions(&self) -> Vec<Arc<Session>> {
        let now = Utc::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| Arc::clone(&entry.session))
            .collect()
    }

    /// Ids of entries expired at `now`.
    pub async fn expired_ids(&self, now: DateTime<Utc>) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Remove those `candidates` that are still expired.
    ///
    /// Expiry is re-checked against a clock reading taken after the write
    /// lock is held, so an entry extended since the candidates were collected
    /// survives.
    pub async fn remove_expired(&self, candidates: &[String]) -> Vec<Arc<Session>> {
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        candidates
            .iter()
            .filter_map(|id| {
                if entries.get(id).is_some_and(|entry| entry.is_expired(now)) {
                    entries.remove(id).map(|entry| entry.session)
                } else {
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CookieConfig;
    use chrono::TimeDelta;

    fn entry(id: &str, expires_at: DateTime<Utc>) -> TableEntry {
        let session = Session::new("s", id, CookieConfig::default());
        TableEntry::new(Arc::new(session), expires_at)
    }

    fn later() -> DateTime<Utc> {
        Utc::now() + TimeDelta::seconds(60)
    }

    fn earlier() -> DateTime<Utc> {
        Utc::now() - TimeDelta::seconds(1)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let table = SessionTable::new();
        assert!(table.try_insert(entry("a", later())).await);

        let stored = table.get("a").await.unwrap();
        assert_eq!(stored.id(), "a");
        assert!(table.contains("a").await);
        assert!(table.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_try_insert_rejects_collision() {
        let table = SessionTable::new();
        assert!(table.try_insert(entry("a", later())).await);
        assert!(!table.try_insert(entry("a", later())).await);
        // Expired ids are not recycled either.
        assert!(table.try_insert(entry("b", earlier())).await);
        assert!(!table.try_insert(entry("b", later())).await);
        assert_eq!(table.len().await, 2);
    }

    #[tokio::test]
    async fn test_get_drops_expired_entry() {
        let table = SessionTable::new();
        table.upsert(entry("a", earlier())).await;
        assert_eq!(table.len().await, 1);

        assert!(table.get("a").await.is_none());
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let table = SessionTable::new();
        let first = later();
        table.upsert(entry("a", first)).await;
        let second = first + TimeDelta::seconds(10);
        table.upsert(entry("a", second)).await;

        assert_eq!(table.len().await, 1);
        assert_eq!(table.expiry_of("a").await, Some(second));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let table = SessionTable::new();
        table.upsert(entry("a", later())).await;
        assert!(table.remove("a").await);
        assert!(!table.remove("a").await);
    }

    #[tokio::test]
    async fn test_remove_expired_rechecks() {
        let table = SessionTable::new();
        table.upsert(entry("a", earlier())).await;
        table.upsert(entry("b", earlier())).await;
        table.upsert(entry("c", later())).await;

        let candidates = table.expired_ids(Utc::now()).await;
        assert_eq!(candidates.len(), 2);

        // "b" is extended between the scan and the removal.
        table.upsert(entry("b", later())).await;

        let removed = table.remove_expired(&candidates).await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id(), "a");
        assert!(table.contains("b").await);
        assert!(table.contains("c").await);
        assert_eq!(table.live_sessions().await.len(), 2);
    }
}
