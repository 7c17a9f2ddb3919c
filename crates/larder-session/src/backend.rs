//! Session backend trait for pluggable storage.
//!
//! The in-process [`MemoryStore`](crate::MemoryStore) and durable adapters
//! implement the same contract, so request handlers can hold an
//! `Arc<dyn Backend>` without caring where sessions live.

use async_trait::async_trait;

use crate::error::Result;
use crate::exchange::{IdentifierSink, IdentifierSource};
use crate::session::Session;

/// Trait for session storage backends.
///
/// # Thread Safety
///
/// Implementations are shared between concurrent request handlers and must
/// be `Send + Sync`. Sessions returned from [`lookup_or_create`] are private
/// copies; handlers mutate them freely and write them back with [`save`].
///
/// [`lookup_or_create`]: Backend::lookup_or_create
/// [`save`]: Backend::save
#[async_trait]
pub trait Backend: Send + Sync {
    /// Return the session the client identified for slot `name`, or a new one.
    ///
    /// On a hit the result is an isolated copy with `is_fresh() == false`.
    /// On a miss (no identifier, unknown identifier, or expired session) a new
    /// session with a newly generated id is registered and returned fresh.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` for names that cannot be exchanged as cookies,
    /// and propagates id generation, copy and backend failures. No session is
    /// returned on error.
    async fn lookup_or_create(
        &self,
        source: &(dyn IdentifierSource + Sync),
        name: &str,
    ) -> Result<Session>;

    /// Register and return a fresh session for slot `name`.
    async fn new_session(&self, name: &str) -> Result<Session>;

    /// Write `session` back, replacing any stored state for its id.
    ///
    /// Last writer wins: concurrent saves of the same id are not detected.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Remove the session. Deleting an unknown id is not an error.
    async fn delete(&self, session: &Session) -> Result<()>;

    /// Save `session` and hand its identifier to the response side.
    async fn persist(
        &self,
        sink: &mut (dyn IdentifierSink + Send),
        session: &Session,
    ) -> Result<()> {
        self.save(session).await?;
        sink.write_identifier(session.name(), session.id(), session.cookie_config());
        Ok(())
    }
}
