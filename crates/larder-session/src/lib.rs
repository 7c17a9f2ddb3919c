//! Server-side session store engine.
//!
//! This crate holds per-client sessions keyed by opaque identifiers with:
//! - Lookup-or-create that hands every caller an isolated copy
//! - Collision-free identifiers from the OS entropy source
//! - A background eviction loop with an optional observer channel
//! - A [`Backend`] trait shared with durable adapters
//!
//! # Example
//!
//! ```rust,ignore
//! use larder_session::{Backend, IssuedIdentifiers, MemoryStore, NoIdentifier, StoreConfig};
//!
//! let store = MemoryStore::new(StoreConfig::default().with_max_age(Duration::from_secs(3600)))?;
//!
//! let session = store.lookup_or_create(&NoIdentifier, "session").await?;
//! session.set("user", "coco")?;
//!
//! let mut response = IssuedIdentifiers::new();
//! store.persist(&mut response, &session).await?;
//! ```

mod backend;
mod config;
pub mod copy;
mod error;
mod exchange;
mod gc;
pub mod id;
mod session;
mod store;
mod table;
mod value;

pub use backend::Backend;
pub use config::{CookieConfig, SameSite, StoreConfig};
pub use error::{Error, Result};
pub use exchange::{
    IdentifierSink, IdentifierSource, IssuedIdentifier, IssuedIdentifiers, NoIdentifier,
    validate_name,
};
pub use gc::EvictionEvents;
pub use session::{Session, SessionRecord};
pub use store::MemoryStore;
pub use table::{SessionTable, TableEntry};
pub use value::Value;
