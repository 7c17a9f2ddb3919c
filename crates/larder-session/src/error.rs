//! Error types for session store operations.

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The entropy source failed while generating a session id.
    #[error("Failed to generate session id: {0}")]
    Generation(String),

    /// Every generated candidate id collided with a live session.
    #[error("Exhausted session id space after {attempts} attempts")]
    ExhaustedIdSpace { attempts: usize },

    /// A payload value cannot be stored or copied safely.
    #[error("Unsupported session value: {0}")]
    UnsupportedType(String),

    /// The session name contains characters illegal in a cookie name.
    #[error("Invalid character in session name: {0:?}")]
    InvalidName(String),

    /// The durable backend could not be reached or answered with a protocol error.
    #[error("Session backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A session record failed to encode or decode.
    #[error("Session serialization failed: {0}")]
    Serialization(String),

    /// The store was constructed with an invalid configuration.
    #[error("Invalid session store configuration: {0}")]
    InvalidConfig(String),

    /// The consumer of observed evictions dropped its receiver.
    #[error("Eviction observer disconnected")]
    EvictionChannelClosed,
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;
