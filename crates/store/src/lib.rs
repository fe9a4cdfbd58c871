//! Store and cache implementations for FinMentor.

pub mod cache;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use cache::{fingerprint, InMemoryCache, NoopCache};
pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
