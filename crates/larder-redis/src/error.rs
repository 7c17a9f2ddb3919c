//! Error types for the key/value transport.

/// Errors raised while talking to the remote key/value store.
///
/// A missing key is never an error; transports report it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Error from the Redis client or server.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The transport cannot serve requests right now.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

impl From<TransportError> for larder_session::Error {
    fn from(e: TransportError) -> Self {
        larder_session::Error::BackendUnavailable(e.to_string())
    }
}
