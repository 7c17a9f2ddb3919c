//! Redis-backed durable session store.
//!
//! Implements the [`larder_session::Backend`] contract against a remote
//! key/value service. Sessions are serialized to JSON and written with a
//! server-enforced TTL equal to their `max_age`, so no local eviction loop
//! is needed.
//!
//! # Example
//!
//! ```no_run
//! use larder_redis::{RedisConfig, RedisStore};
//! use larder_session::{Backend, IssuedIdentifiers, NoIdentifier};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisStore::connect(RedisConfig::new("redis://127.0.0.1:6379")).await?;
//! let session = store.lookup_or_create(&NoIdentifier, "session").await?;
//! session.set("user", "coco")?;
//!
//! let mut response = IssuedIdentifiers::new();
//! store.persist(&mut response, &session).await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
mod config;
mod error;
#[cfg(feature = "testing")]
mod memory;
mod store;
mod transport;

pub use config::{DEFAULT_KEY_PREFIX, DEFAULT_URL, RedisConfig};
pub use error::TransportError;
#[cfg(feature = "testing")]
pub use memory::MemoryTransport;
pub use store::RedisStore;
pub use transport::{KvTransport, RedisTransport};
