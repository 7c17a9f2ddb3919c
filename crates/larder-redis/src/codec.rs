//! JSON encoding of sessions for the remote store.
//!
//! Sessions travel as [`SessionRecord`]s: every field of the session, and
//! nothing of its lock.

use larder_session::{Error, Result, Session, SessionRecord};

/// Encode a session snapshot.
pub fn encode(session: &Session) -> Result<Vec<u8>> {
    serde_json::to_vec(&session.to_record()).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a session, validating its payload.
pub fn decode(bytes: &[u8]) -> Result<Session> {
    let record: SessionRecord =
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
    Session::from_record(record)
}
