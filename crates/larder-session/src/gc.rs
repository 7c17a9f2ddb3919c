//! Background eviction of expired sessions.
//!
//! The loop runs as an owned tokio task that is stopped through a
//! [`CancellationToken`]. Each tick scans the table under its read lock and,
//! if anything has expired, removes it under the write lock after
//! re-checking expiry.
//!
//! In observed mode every non-empty batch of removed sessions is published
//! on a bounded channel. A slot is reserved before the write lock is taken,
//! so a consumer that stops draining stalls the loop (and only the loop).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;
use crate::session::Session;
use crate::table::SessionTable;

/// Capacity of the eviction error channel.
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Receivers for observed eviction.
#[derive(Debug)]
pub struct EvictionEvents {
    /// Isolated copies of each batch of removed sessions.
    pub batches: mpsc::Receiver<Vec<Session>>,

    /// Failures encountered while publishing batches.
    pub errors: mpsc::Receiver<Error>,
}

/// Producer half of [`EvictionEvents`].
#[derive(Debug, Clone)]
pub(crate) struct EvictionObserver {
    batches: mpsc::Sender<Vec<Session>>,
    errors: mpsc::Sender<Error>,
}

impl EvictionObserver {
    /// Create a linked observer/receiver pair holding up to `capacity` batches.
    pub(crate) fn channel(capacity: usize) -> (Self, EvictionEvents) {
        let (batch_tx, batch_rx) = mpsc::channel(capacity.max(1));
        let (error_tx, error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        (
            Self {
                batches: batch_tx,
                errors: error_tx,
            },
            EvictionEvents {
                batches: batch_rx,
                errors: error_rx,
            },
        )
    }

    /// Report without blocking; dropped if the error channel is full.
    fn report(&self, error: Error) {
        warn!(error = %error, "Eviction observer error");
        if self.errors.try_send(error).is_err() {
            debug!("Eviction error channel full or closed, dropping error");
        }
    }
}

/// Remove expired sessions from `table`, publishing them if observed.
///
/// Returns the number of sessions removed.
pub(crate) async fn sweep(table: &SessionTable, observer: Option<&EvictionObserver>) -> usize {
    let candidates = table.expired_ids(Utc::now()).await;
    if candidates.is_empty() {
        return 0;
    }

    let permit = match observer {
        Some(observer) => match observer.batches.reserve().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                observer.report(Error::EvictionChannelClosed);
                None
            }
        },
        None => None,
    };

    let removed = table.remove_expired(&candidates).await;
    let count = removed.len();
    if count > 0 {
        debug!(count, "Evicted expired sessions");
    }

    if let (Some(permit), Some(observer)) = (permit, observer) {
        if removed.is_empty() {
            return 0;
        }
        let mut batch = Vec::with_capacity(count);
        for session in &removed {
            match session.isolated_copy() {
                Ok(copy) => batch.push(copy),
                Err(e) => observer.report(e),
            }
        }
        permit.send(batch);
    }

    count
}

/// Handle to a running eviction loop.
///
/// Dropping the handle cancels the loop.
#[derive(Debug)]
pub(crate) struct GcHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl GcHandle {
    /// Spawn the eviction loop on the current tokio runtime.
    pub(crate) fn spawn(
        table: Arc<SessionTable>,
        interval: Duration,
        observer: Option<EvictionObserver>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            run(table, interval, observer, token).await;
        });
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Stop the loop and wait for it to finish.
    pub(crate) async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Eviction task ended abnormally");
            }
        }
    }
}

impl Drop for GcHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    table: Arc<SessionTable>,
    interval: Duration,
    observer: Option<EvictionObserver>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(interval_ms = interval.as_millis() as u64, "Eviction loop started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = async {
                ticker.tick().await;
                sweep(&table, observer.as_ref()).await;
            } => {}
        }
    }

    debug!("Eviction loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CookieConfig;
    use crate::table::TableEntry;
    use chrono::TimeDelta;

    async fn table_with(ids: &[(&str, i64)]) -> Arc<SessionTable> {
        let table = Arc::new(SessionTable::new());
        for (id, offset) in ids {
            let session = Session::new("s", *id, CookieConfig::default());
            session.set("id", *id).unwrap();
            let expires_at = Utc::now() + TimeDelta::seconds(*offset);
            table
                .upsert(TableEntry::new(Arc::new(session), expires_at))
                .await;
        }
        table
    }

    #[tokio::test]
    async fn test_silent_sweep() {
        let table = table_with(&[("a", -1), ("b", -1), ("c", 60)]).await;
        assert_eq!(sweep(&table, None).await, 2);
        assert_eq!(table.len().await, 1);
        assert_eq!(sweep(&table, None).await, 0);
    }

    #[tokio::test]
    async fn test_observed_sweep_publishes_copies() {
        let table = table_with(&[("a", -1), ("b", -1), ("c", 60)]).await;
        let (observer, mut events) = EvictionObserver::channel(4);

        assert_eq!(sweep(&table, Some(&observer)).await, 2);

        let batch = events.batches.try_recv().unwrap();
        let mut ids: Vec<&str> = batch.iter().map(|s| s.id()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(batch[0].get("id").unwrap().as_str(), Some(batch[0].id()));

        // Nothing expired, nothing published.
        assert_eq!(sweep(&table, Some(&observer)).await, 0);
        assert!(events.batches.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_observer_still_evicts() {
        let table = table_with(&[("a", -1)]).await;
        let (observer, events) = EvictionObserver::channel(1);
        let EvictionEvents {
            batches,
            mut errors,
        } = events;
        drop(batches);

        assert_eq!(sweep(&table, Some(&observer)).await, 1);
        assert!(table.is_empty().await);
        assert!(matches!(
            errors.try_recv(),
            Ok(Error::EvictionChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_full_channel_stalls_loop_not_table() {
        let table = table_with(&[("a", -1)]).await;
        let (observer, mut events) = EvictionObserver::channel(1);
        assert_eq!(sweep(&table, Some(&observer)).await, 1);

        // The only slot is taken; the next sweep waits for the consumer.
        let table2 = table_with(&[("b", -1)]).await;
        let stalled = tokio::time::timeout(
            Duration::from_millis(50),
            sweep(&table2, Some(&observer)),
        )
        .await;
        assert!(stalled.is_err());
        // Foreground access is unaffected while the sweep waits.
        assert_eq!(table2.len().await, 1);

        events.batches.recv().await.unwrap();
        assert_eq!(sweep(&table2, Some(&observer)).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_loop_evicts_and_stops() {
        let table = table_with(&[("a", -1)]).await;
        let handle = GcHandle::spawn(Arc::clone(&table), Duration::from_millis(10), None);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(table.is_empty().await);

        handle.shutdown().await;
    }
}
